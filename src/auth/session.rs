use anyhow::Context;
use axum::{extract::FromRef, http::HeaderValue};
use axum_extra::extract::CookieJar;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::debug;

use super::{
    callbacks,
    claims::SessionClaims,
    cookies::SESSION_COOKIE,
    dto::{Session, SessionUser},
    jwt::SessionKeys,
};
use crate::{config::AuthConfig, error::AuthError, state::AppState};

/// Reads the session cookie and runs it through session enrichment.
/// `None` when there is no cookie or the token does not verify.
pub async fn current_session(
    state: &AppState,
    jar: &CookieJar,
) -> Result<Option<Session>, AuthError> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };

    let keys = SessionKeys::from_ref(state);
    let claims = match keys.verify_session(cookie.value()) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "ignoring invalid session token");
            return Ok(None);
        }
    };

    let session = session_from_claims(claims)?;
    callbacks::session(state.users.as_ref(), session).await.map(Some)
}

fn session_from_claims(claims: SessionClaims) -> anyhow::Result<Session> {
    let expires = OffsetDateTime::from_unix_timestamp(claims.exp as i64)
        .context("session expiry out of range")?
        .format(&Rfc3339)
        .context("format session expiry")?;

    Ok(Session {
        user: Some(SessionUser {
            id: None,
            name: claims.name,
            email: claims.email,
            image: claims.picture,
        }),
        expires,
    })
}

/// Keeps redirects on our own origin; anything else goes to the base URL.
/// The result is always usable as a `Location` header value.
pub fn safe_callback_url(config: &AuthConfig, requested: Option<&str>) -> String {
    let base = config.base_url.as_str();
    let candidate = match requested {
        Some(url) if url.chars().any(char::is_control) => None,
        Some(url) if url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\") => {
            Some(format!("{base}{url}"))
        }
        Some(url) if url == base || url.starts_with(&format!("{base}/")) => Some(url.to_string()),
        _ => None,
    };
    match candidate {
        Some(url) if HeaderValue::from_str(&url).is_ok() => url,
        _ => base.to_string(),
    }
}

pub fn login_url(config: &AuthConfig, param: &str, value: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(value.as_bytes()).collect();
    let separator = if config.login_page.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", config.login_page, separator, param, encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{cookies, provider::ExternalIdentity},
        testing::{test_config, test_state, MemoryUserStore},
    };
    use axum_extra::extract::cookie::Cookie;
    use std::sync::Arc;

    fn auth_config() -> AuthConfig {
        test_config().auth
    }

    #[test]
    fn relative_callback_urls_are_resolved_against_base() {
        let config = auth_config();
        assert_eq!(
            safe_callback_url(&config, Some("/dashboard?tab=1")),
            "http://localhost:8080/dashboard?tab=1"
        );
        assert_eq!(
            safe_callback_url(&config, Some("http://localhost:8080/settings")),
            "http://localhost:8080/settings"
        );
    }

    #[test]
    fn foreign_callback_urls_fall_back_to_base() {
        let config = auth_config();
        for url in [
            "https://evil.example/phish",
            "//evil.example/phish",
            "http://localhost:8080.evil.example/",
            "javascript:alert(1)",
        ] {
            assert_eq!(safe_callback_url(&config, Some(url)), "http://localhost:8080");
        }
        assert_eq!(safe_callback_url(&config, None), "http://localhost:8080");
    }

    #[test]
    fn callback_urls_with_control_characters_fall_back_to_base() {
        let config = auth_config();
        for url in [
            "/dash\nboard",
            "/dash\r\nSet-Cookie: x=1",
            "/tab\there",
            "http://localhost:8080/a\u{7f}b",
        ] {
            assert_eq!(safe_callback_url(&config, Some(url)), "http://localhost:8080");
        }
    }

    #[test]
    fn login_url_encodes_value() {
        let config = auth_config();
        assert_eq!(
            login_url(&config, "callbackUrl", "/me?x=1"),
            "/login?callbackUrl=%2Fme%3Fx%3D1"
        );
        assert_eq!(
            login_url(&config, "error", "CredentialsSignin"),
            "/login?error=CredentialsSignin"
        );
    }

    #[tokio::test]
    async fn missing_or_garbage_cookie_yields_no_session() {
        let state = test_state(Arc::new(MemoryUserStore::new()), ExternalIdentity::default());
        assert!(current_session(&state, &CookieJar::new())
            .await
            .expect("session")
            .is_none());

        let jar = CookieJar::new().add(Cookie::new(cookies::SESSION_COOKIE, "garbage"));
        assert!(current_session(&state, &jar).await.expect("session").is_none());
    }

    #[tokio::test]
    async fn valid_cookie_is_enriched_from_the_store() {
        let users = Arc::new(MemoryUserStore::new());
        let stored = users
            .insert_with_password("ada@example.com", "analytical-engine")
            .await;
        let state = test_state(users, ExternalIdentity::default());

        let token = SessionKeys::from_ref(&state)
            .sign_session(&ExternalIdentity {
                id: "token-sub".into(),
                email: Some("ada@example.com".into()),
                name: None,
                image: None,
            })
            .expect("sign");
        let jar = CookieJar::new().add(Cookie::new(cookies::SESSION_COOKIE, token));

        let session = current_session(&state, &jar)
            .await
            .expect("session")
            .expect("signed in");
        let user = session.user.expect("user");
        assert_eq!(user.id, Some(stored.id.to_string()));
        assert_eq!(user.name, stored.name);
        assert_eq!(user.image, stored.image);
        assert!(OffsetDateTime::parse(&session.expires, &Rfc3339).is_ok());
    }
}
