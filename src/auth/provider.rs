use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::AuthError, users::User};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[serde(rename = "github")]
    GitHub,
    Credentials,
}

impl ProviderId {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::GitHub => "github",
            ProviderId::Credentials => "credentials",
        }
    }
}

/// Identity as reported by a provider, before it is matched to a local user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalIdentity {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
}

impl From<&User> for ExternalIdentity {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: Some(user.email.clone()),
            name: user.name.clone(),
            image: user.image.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub provider: ProviderId,
    pub provider_account_id: String,
}

/// Everything needed to send the browser to the provider and later verify the callback.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub pkce_verifier: String,
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn name(&self) -> &'static str;

    fn authorization_request(&self) -> AuthorizationRequest;

    /// Trade the authorization code for the user's identity.
    async fn exchange(&self, code: &str, pkce_verifier: &str)
        -> Result<ExternalIdentity, AuthError>;
}
