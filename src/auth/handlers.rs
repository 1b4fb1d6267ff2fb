use std::collections::BTreeMap;

use axum::{
    extract::{FromRef, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Form, Json, Router,
};
use axum_extra::extract::CookieJar;
use lazy_static::lazy_static;
use rand::{distributions::Alphanumeric, Rng};
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        callbacks,
        cookies::{self, CSRF_COOKIE, OAUTH_STATE_COOKIE, SESSION_COOKIE},
        dto::{
            CallbackUrlQuery, CredentialsForm, CsrfForm, CsrfResponse, OAuthCallbackParams,
            ProviderInfo, PublicUser, RegisterRequest, SessionUser, UrlResponse,
        },
        extractors::AuthSession,
        jwt::SessionKeys,
        password,
        provider::{Account, ExternalIdentity, ProviderId},
        session::{current_session, login_url, safe_callback_url},
    },
    error::AuthError,
    state::AppState,
    users::NewUser,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/providers", get(providers))
        .route("/csrf", get(csrf))
        .route("/session", get(session))
        .route("/signin", get(signin_page))
        .route("/signin/github", post(signin_github))
        .route("/callback/github", get(callback_github))
        .route("/callback/credentials", post(callback_credentials))
        .route("/register", post(register))
        .route("/signout", post(signout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn new_csrf_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Double-submit check: the posted token must equal the one sealed in the csrf cookie.
fn check_csrf(jar: &CookieJar, keys: &SessionKeys, submitted: Option<&str>) -> Result<(), AuthError> {
    let submitted = submitted.filter(|t| !t.is_empty()).ok_or(AuthError::InvalidCsrf)?;
    let cookie = jar.get(CSRF_COOKIE).ok_or(AuthError::InvalidCsrf)?;
    let claims = keys
        .verify_csrf(cookie.value())
        .map_err(|_| AuthError::InvalidCsrf)?;
    if claims.token != submitted {
        warn!("csrf token mismatch");
        return Err(AuthError::InvalidCsrf);
    }
    Ok(())
}

async fn providers(State(state): State<AppState>) -> Json<BTreeMap<&'static str, ProviderInfo>> {
    let base = format!("{}/api/auth", state.config.auth.base_url);
    let oauth_id = state.oauth.id().as_str();
    let credentials_id = ProviderId::Credentials.as_str();

    let mut map = BTreeMap::new();
    map.insert(
        oauth_id,
        ProviderInfo {
            id: oauth_id,
            name: state.oauth.name(),
            kind: "oauth",
            signin_url: format!("{base}/signin/{oauth_id}"),
            callback_url: format!("{base}/callback/{oauth_id}"),
        },
    );
    map.insert(
        credentials_id,
        ProviderInfo {
            id: credentials_id,
            name: "Credentials",
            kind: "credentials",
            signin_url: format!("{base}/signin/{credentials_id}"),
            callback_url: format!("{base}/callback/{credentials_id}"),
        },
    );
    Json(map)
}

#[instrument(skip_all)]
async fn csrf(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<CsrfResponse>), AuthError> {
    let keys = SessionKeys::from_ref(&state);
    if let Some(claims) = jar
        .get(CSRF_COOKIE)
        .and_then(|c| keys.verify_csrf(c.value()).ok())
    {
        return Ok((jar, Json(CsrfResponse { csrf_token: claims.token })));
    }

    let token = new_csrf_token();
    let sealed = keys.sign_csrf(&token)?;
    let jar = jar.add(cookies::csrf_cookie(sealed, &state.config.auth));
    Ok((jar, Json(CsrfResponse { csrf_token: token })))
}

#[instrument(skip_all)]
async fn session(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<serde_json::Value>, AuthError> {
    let body = match current_session(&state, &jar).await? {
        Some(session) => serde_json::to_value(session).map_err(anyhow::Error::from)?,
        None => serde_json::json!({}),
    };
    Ok(Json(body))
}

async fn signin_page(
    State(state): State<AppState>,
    Query(query): Query<CallbackUrlQuery>,
) -> Redirect {
    let auth = &state.config.auth;
    match query.callback_url.as_deref() {
        Some(url) => Redirect::to(&login_url(auth, "callbackUrl", url)),
        None => Redirect::to(&auth.login_page),
    }
}

#[instrument(skip_all)]
async fn signin_github(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CsrfForm>,
) -> Result<(CookieJar, Redirect), AuthError> {
    let keys = SessionKeys::from_ref(&state);
    check_csrf(&jar, &keys, form.csrf_token.as_deref())?;

    let request = state.oauth.authorization_request();
    let callback_url = safe_callback_url(&state.config.auth, form.callback_url.as_deref());
    let sealed = keys.sign_oauth_state(&request.state, &request.pkce_verifier, &callback_url)?;

    info!("redirecting to github");
    let jar = jar.add(cookies::oauth_state_cookie(sealed, &state.config.auth));
    Ok((jar, Redirect::to(&request.url)))
}

/// Validates the callback and returns the session token plus where to send the browser.
async fn complete_github(
    state: &AppState,
    jar: &CookieJar,
    params: OAuthCallbackParams,
) -> Result<(String, String), AuthError> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        return Err(AuthError::OAuth(format!("{error}: {description}")));
    }

    let keys = SessionKeys::from_ref(state);
    let sealed = jar.get(OAUTH_STATE_COOKIE).ok_or(AuthError::InvalidOAuthState)?;
    let expected = keys
        .verify_oauth_state(sealed.value())
        .map_err(|_| AuthError::InvalidOAuthState)?;
    if params.state.as_deref() != Some(expected.state.as_str()) {
        return Err(AuthError::InvalidOAuthState);
    }
    let code = params
        .code
        .ok_or_else(|| AuthError::OAuth("missing authorization code".into()))?;

    let identity = state.oauth.exchange(&code, &expected.pkce_verifier).await?;
    let account = Account {
        provider: state.oauth.id(),
        provider_account_id: identity.id.clone(),
    };
    callbacks::sign_in(state.users.as_ref(), &identity, &account).await?;

    let token = keys.sign_session(&identity)?;
    info!(provider_account_id = %account.provider_account_id, "github sign-in");
    Ok((token, expected.callback_url))
}

#[instrument(skip_all)]
async fn callback_github(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<OAuthCallbackParams>,
) -> (CookieJar, Redirect) {
    let outcome = complete_github(&state, &jar, params).await;
    let jar = jar.remove(cookies::removal(OAUTH_STATE_COOKIE));

    match outcome {
        Ok((token, callback_url)) => {
            let jar = jar.add(cookies::session_cookie(token, &state.config.auth));
            (jar, Redirect::to(&callback_url))
        }
        Err(e) => {
            match &e {
                AuthError::Internal(inner) => error!(error = ?inner, "github callback failed"),
                other => warn!(error = %other, "github callback rejected"),
            }
            let target = login_url(&state.config.auth, "error", e.code());
            (jar, Redirect::to(&target))
        }
    }
}

#[instrument(skip_all)]
async fn callback_credentials(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CredentialsForm>,
) -> Result<(CookieJar, Json<UrlResponse>), AuthError> {
    let keys = SessionKeys::from_ref(&state);
    check_csrf(&jar, &keys, form.csrf_token.as_deref())?;

    let mut credentials = form.credentials();
    credentials.email = credentials.email.as_deref().map(normalize_email);
    let user = callbacks::authorize(state.users.as_ref(), credentials).await?;
    let identity = ExternalIdentity::from(&user);
    let account = Account {
        provider: ProviderId::Credentials,
        provider_account_id: user.id.to_string(),
    };
    callbacks::sign_in(state.users.as_ref(), &identity, &account).await?;

    let token = keys.sign_session(&identity)?;
    let url = safe_callback_url(&state.config.auth, form.callback_url.as_deref());

    info!(user_id = %user.id, "credentials sign-in");
    let jar = jar.add(cookies::session_cookie(token, &state.config.auth));
    Ok((jar, Json(UrlResponse { url })))
}

#[instrument(skip(state, payload))]
async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AuthError> {
    payload.email = normalize_email(&payload.email);

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AuthError::InvalidEmail);
    }

    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(AuthError::WeakPassword);
    }

    if state.users.find_by_email(&payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(AuthError::EmailTaken);
    }

    let plain = payload.password;
    let hash = tokio::task::spawn_blocking(move || password::hash_password(&plain))
        .await
        .map_err(anyhow::Error::from)??;

    let new_user = NewUser {
        email: payload.email,
        name: payload.name,
        image: None,
        password_hash: Some(hash),
    };
    // A concurrent registration can still win between the lookup and the insert.
    let user = state
        .users
        .create(new_user)
        .await?
        .ok_or(AuthError::EmailTaken)?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(PublicUser {
            id: user.id,
            email: user.email,
            name: user.name,
            image: user.image,
        }),
    ))
}

#[instrument(skip_all)]
async fn signout(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CsrfForm>,
) -> Result<(CookieJar, Json<UrlResponse>), AuthError> {
    let keys = SessionKeys::from_ref(&state);
    check_csrf(&jar, &keys, form.csrf_token.as_deref())?;

    let url = safe_callback_url(&state.config.auth, form.callback_url.as_deref());
    let jar = jar.remove(cookies::removal(SESSION_COOKIE));
    Ok((jar, Json(UrlResponse { url })))
}

async fn get_me(AuthSession(session): AuthSession) -> Json<SessionUser> {
    Json(session.user.unwrap_or_default())
}
