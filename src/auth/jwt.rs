use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use super::{
    claims::{CsrfClaims, OAuthStateClaims, SessionClaims, TokenKind},
    provider::ExternalIdentity,
};
use crate::{config::AuthConfig, state::AppState};

const OAUTH_STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Signing and verification keys for every token the service issues.
#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub session_ttl: Duration,
    pub state_ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.auth)
    }
}

impl SessionKeys {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            session_ttl: Duration::from_secs((config.session_max_age_minutes.max(1) as u64) * 60),
            state_ttl: OAUTH_STATE_TTL,
        }
    }

    fn window(ttl: Duration) -> (usize, usize) {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        (now.unix_timestamp() as usize, exp.unix_timestamp() as usize)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> anyhow::Result<String> {
        Ok(encode(&Header::default(), claims, &self.encoding)?)
    }

    fn decode_claims<T: DeserializeOwned>(&self, token: &str) -> anyhow::Result<T> {
        let data = decode::<T>(token, &self.decoding, &Validation::default())?;
        Ok(data.claims)
    }

    pub fn sign_session(&self, identity: &ExternalIdentity) -> anyhow::Result<String> {
        let (iat, exp) = Self::window(self.session_ttl);
        let claims = SessionClaims {
            sub: identity.id.clone(),
            email: identity.email.clone(),
            name: identity.name.clone(),
            picture: identity.image.clone(),
            iat,
            exp,
            kind: TokenKind::Session,
        };
        let token = self.sign(&claims)?;
        debug!(sub = %claims.sub, "session token signed");
        Ok(token)
    }

    pub fn verify_session(&self, token: &str) -> anyhow::Result<SessionClaims> {
        let claims: SessionClaims = self.decode_claims(token)?;
        if claims.kind != TokenKind::Session {
            anyhow::bail!("not a session token");
        }
        debug!(sub = %claims.sub, "session token verified");
        Ok(claims)
    }

    pub fn sign_oauth_state(
        &self,
        state: &str,
        pkce_verifier: &str,
        callback_url: &str,
    ) -> anyhow::Result<String> {
        let (iat, exp) = Self::window(self.state_ttl);
        self.sign(&OAuthStateClaims {
            state: state.to_string(),
            pkce_verifier: pkce_verifier.to_string(),
            callback_url: callback_url.to_string(),
            iat,
            exp,
            kind: TokenKind::OauthState,
        })
    }

    pub fn verify_oauth_state(&self, token: &str) -> anyhow::Result<OAuthStateClaims> {
        let claims: OAuthStateClaims = self.decode_claims(token)?;
        if claims.kind != TokenKind::OauthState {
            anyhow::bail!("not an oauth state token");
        }
        Ok(claims)
    }

    pub fn sign_csrf(&self, csrf_token: &str) -> anyhow::Result<String> {
        let (iat, exp) = Self::window(self.session_ttl);
        self.sign(&CsrfClaims {
            token: csrf_token.to_string(),
            iat,
            exp,
            kind: TokenKind::Csrf,
        })
    }

    pub fn verify_csrf(&self, token: &str) -> anyhow::Result<CsrfClaims> {
        let claims: CsrfClaims = self.decode_claims(token)?;
        if claims.kind != TokenKind::Csrf {
            anyhow::bail!("not a csrf token");
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str) -> SessionKeys {
        SessionKeys::new(&AuthConfig {
            secret: secret.into(),
            base_url: "http://localhost:8080".into(),
            login_page: "/login".into(),
            session_max_age_minutes: 60,
            secure_cookies: false,
        })
    }

    fn identity() -> ExternalIdentity {
        ExternalIdentity {
            id: "42".into(),
            email: Some("mona@example.com".into()),
            name: Some("Mona".into()),
            image: None,
        }
    }

    #[test]
    fn sign_and_verify_session_token() {
        let keys = make_keys("dev-secret");
        let token = keys.sign_session(&identity()).expect("sign session");
        let claims = keys.verify_session(&token).expect("verify session");
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.email.as_deref(), Some("mona@example.com"));
        assert_eq!(claims.name.as_deref(), Some("Mona"));
        assert_eq!(claims.picture, None);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn session_verification_rejects_other_kinds() {
        let keys = make_keys("dev-secret");
        let csrf = keys.sign_csrf("abc").expect("sign csrf");
        let err = keys.verify_session(&csrf).unwrap_err();
        assert!(!err.to_string().is_empty());

        let session = keys.sign_session(&identity()).expect("sign session");
        assert!(keys.verify_csrf(&session).is_err());
        assert!(keys.verify_oauth_state(&session).is_err());
    }

    #[test]
    fn oauth_state_roundtrip() {
        let keys = make_keys("dev-secret");
        let token = keys
            .sign_oauth_state("state-1", "verifier-1", "/dashboard")
            .expect("sign state");
        let claims = keys.verify_oauth_state(&token).expect("verify state");
        assert_eq!(claims.state, "state-1");
        assert_eq!(claims.pkce_verifier, "verifier-1");
        assert_eq!(claims.callback_url, "/dashboard");
        assert_eq!(claims.exp - claims.iat, 600);
    }

    #[test]
    fn verify_rejects_foreign_secret() {
        let ours = make_keys("our-secret");
        let theirs = make_keys("their-secret");
        let token = theirs.sign_session(&identity()).expect("sign");
        assert!(ours.verify_session(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_token() {
        let keys = make_keys("dev-secret");
        let now = OffsetDateTime::now_utc().unix_timestamp() as usize;
        let expired = SessionClaims {
            sub: "42".into(),
            email: None,
            name: None,
            picture: None,
            iat: now - 7200,
            exp: now - 3600,
            kind: TokenKind::Session,
        };
        let token = keys.sign(&expired).expect("sign");
        assert!(keys.verify_session(&token).is_err());
    }
}
