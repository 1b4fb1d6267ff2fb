use async_trait::async_trait;
use oauth2::{
    basic::BasicClient, reqwest::async_http_client, AuthUrl, AuthorizationCode, ClientId,
    ClientSecret, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope,
    TokenResponse, TokenUrl,
};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::provider::{AuthorizationRequest, ExternalIdentity, OAuthProvider, ProviderId};
use crate::{config::GitHubConfig, error::AuthError};

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const USER_URL: &str = "https://api.github.com/user";
const EMAILS_URL: &str = "https://api.github.com/user/emails";
const USER_AGENT: &str = "authgate";

#[derive(Debug, Deserialize)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

pub struct GitHubProvider {
    client: BasicClient,
    http: reqwest::Client,
}

impl GitHubProvider {
    pub fn new(config: &GitHubConfig) -> anyhow::Result<Self> {
        let client = BasicClient::new(
            ClientId::new(config.client_id.clone()),
            Some(ClientSecret::new(config.client_secret.clone())),
            AuthUrl::new(AUTHORIZE_URL.to_string())?,
            Some(TokenUrl::new(TOKEN_URL.to_string())?),
        )
        .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone())?);

        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self { client, http })
    }

    async fn fetch_emails(&self, access_token: &str) -> Result<Vec<GitHubEmail>, AuthError> {
        let emails = self
            .http
            .get(EMAILS_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<GitHubEmail>>()
            .await?;
        Ok(emails)
    }
}

#[async_trait]
impl OAuthProvider for GitHubProvider {
    fn id(&self) -> ProviderId {
        ProviderId::GitHub
    }

    fn name(&self) -> &'static str {
        "GitHub"
    }

    fn authorization_request(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
        let (url, csrf_state) = self
            .client
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("read:user".to_string()))
            .add_scope(Scope::new("user:email".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: url.to_string(),
            state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    #[instrument(skip_all)]
    async fn exchange(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ExternalIdentity, AuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::OAuth(format!("GitHub token exchange failed: {e}")))?;
        let access_token = token.access_token().secret();

        let profile = self
            .http
            .get(USER_URL)
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json::<GitHubUser>()
            .await?;

        // Private profile emails come back as null; the emails endpoint still lists them.
        let emails = if profile.email.is_none() {
            self.fetch_emails(access_token).await?
        } else {
            Vec::new()
        };

        debug!(github_id = profile.id, "github profile fetched");
        Ok(identity_from_profile(profile, emails))
    }
}

fn identity_from_profile(profile: GitHubUser, emails: Vec<GitHubEmail>) -> ExternalIdentity {
    let email = profile.email.or_else(|| {
        emails
            .iter()
            .find(|e| e.primary && e.verified)
            .or_else(|| emails.iter().find(|e| e.verified))
            .map(|e| e.email.clone())
    });

    ExternalIdentity {
        id: profile.id.to_string(),
        email,
        name: profile.name.or(Some(profile.login)),
        image: profile.avatar_url,
    }
}
