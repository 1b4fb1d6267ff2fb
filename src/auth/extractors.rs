use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, OriginalUri},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use tracing::debug;

use super::{
    dto::Session,
    session::{current_session, login_url},
};
use crate::state::AppState;

/// A signed-in session. Unauthenticated requests are redirected to the login page.
pub struct AuthSession(pub Session);

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let session = current_session(state, &jar)
            .await
            .map_err(IntoResponse::into_response)?;

        match session {
            Some(session) if session.user.as_ref().is_some_and(|u| u.email.is_some()) => {
                Ok(AuthSession(session))
            }
            _ => {
                // Nested routers strip their prefix from `parts.uri`.
                let uri = parts
                    .extensions
                    .get::<OriginalUri>()
                    .map(|original| &original.0)
                    .unwrap_or(&parts.uri);
                let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
                debug!(%target, "no session, redirecting to login");
                let login = login_url(&state.config.auth, "callbackUrl", target);
                Err(Redirect::to(&login).into_response())
            }
        }
    }
}
