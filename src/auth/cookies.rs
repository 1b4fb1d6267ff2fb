use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::config::AuthConfig;

pub const SESSION_COOKIE: &str = "authgate.session-token";
pub const CSRF_COOKIE: &str = "authgate.csrf-token";
pub const OAUTH_STATE_COOKIE: &str = "authgate.oauth-state";

fn build(name: &'static str, value: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

pub fn session_cookie(token: String, config: &AuthConfig) -> Cookie<'static> {
    build(
        SESSION_COOKIE,
        token,
        config.session_max_age_minutes * 60,
        config.secure_cookies,
    )
}

pub fn csrf_cookie(token: String, config: &AuthConfig) -> Cookie<'static> {
    build(
        CSRF_COOKIE,
        token,
        config.session_max_age_minutes * 60,
        config.secure_cookies,
    )
}

/// Short-lived; only needs to survive the round trip to GitHub.
pub fn oauth_state_cookie(token: String, config: &AuthConfig) -> Cookie<'static> {
    build(OAUTH_STATE_COOKIE, token, 10 * 60, config.secure_cookies)
}

/// Removal cookie; the path must match the one the cookie was set with.
pub fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}
