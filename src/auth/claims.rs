use serde::{Deserialize, Serialize};

/// Purpose of a signed token, checked on every verification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Session,
    OauthState,
    Csrf,
}

/// Session cookie payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String, // provider account id or local user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub iat: usize,
    pub exp: usize,
    pub kind: TokenKind,
}

/// Round-trip data for the OAuth redirect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStateClaims {
    pub state: String,
    pub pkce_verifier: String,
    pub callback_url: String,
    pub iat: usize,
    pub exp: usize,
    pub kind: TokenKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CsrfClaims {
    pub token: String,
    pub iat: usize,
    pub exp: usize,
    pub kind: TokenKind,
}
