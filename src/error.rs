use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Please provide an email and password")]
    MissingCredentials,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("No email found from GitHub")]
    MissingProviderEmail,

    #[error("Invalid or missing CSRF token")]
    InvalidCsrf,

    #[error("OAuth state mismatch")]
    InvalidOAuthState,

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("Invalid email")]
    InvalidEmail,

    #[error("Password too short")]
    WeakPassword,

    #[error("Email already registered")]
    EmailTaken,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::OAuth(format!("HTTP request error: {err}"))
    }
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::InvalidEmail
            | AuthError::WeakPassword
            | AuthError::InvalidOAuthState => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthError::MissingProviderEmail | AuthError::InvalidCsrf => StatusCode::FORBIDDEN,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::OAuth(_) => StatusCode::BAD_GATEWAY,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code, also used as `?error=` on the login page.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidCredentials => "CredentialsSignin",
            AuthError::MissingProviderEmail => "AccessDenied",
            AuthError::InvalidCsrf => "MissingCSRF",
            AuthError::InvalidOAuthState | AuthError::OAuth(_) => "OAuthCallback",
            AuthError::InvalidEmail | AuthError::WeakPassword | AuthError::EmailTaken => {
                "Registration"
            }
            AuthError::Internal(_) => "Configuration",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match &self {
            AuthError::Internal(e) => {
                error!(error = ?e, "internal error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.code(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        assert_eq!(
            AuthError::MissingCredentials.to_string(),
            "Please provide an email and password"
        );
        assert_eq!(
            AuthError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
        assert_eq!(
            AuthError::MissingProviderEmail.to_string(),
            "No email found from GitHub"
        );
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_details() {
        let err = AuthError::from(anyhow::anyhow!("connection refused to 10.0.0.5"));
        let res = err.into_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("body");
        let text = String::from_utf8(body.to_vec()).expect("utf8");
        assert!(text.contains("Internal server error"));
        assert!(!text.contains("10.0.0.5"));
    }

    #[test]
    fn credential_failures_share_one_code() {
        assert_eq!(AuthError::MissingCredentials.code(), "CredentialsSignin");
        assert_eq!(AuthError::InvalidCredentials.code(), "CredentialsSignin");
        assert_eq!(AuthError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn missing_provider_email_is_access_denied() {
        assert_eq!(AuthError::MissingProviderEmail.code(), "AccessDenied");
        assert_eq!(AuthError::MissingProviderEmail.status(), StatusCode::FORBIDDEN);
    }
}
