use anyhow::Context;
use serde::Deserialize;

const DEFAULT_SESSION_MINUTES: i64 = 60 * 24 * 30;
const MAX_SESSION_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    pub base_url: String,
    pub login_page: String,
    pub session_max_age_minutes: i64,
    pub secure_cookies: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub auth: AuthConfig,
    pub github: GitHubConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests don't touch the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} must be set"));

        let database_url = required("DATABASE_URL")?;
        let secret = lookup("AUTH_SECRET")
            .or_else(|| lookup("NEXTAUTH_SECRET"))
            .context("AUTH_SECRET must be set")?;

        let base_url = lookup("AUTH_URL")
            .unwrap_or_else(|| "http://localhost:8080".into())
            .trim_end_matches('/')
            .to_string();

        let session_max_age_minutes = match lookup("AUTH_SESSION_MAX_AGE_MINUTES") {
            Some(v) => v
                .trim()
                .parse::<i64>()
                .with_context(|| format!("AUTH_SESSION_MAX_AGE_MINUTES is not a number: {v}"))?,
            None => DEFAULT_SESSION_MINUTES,
        };
        anyhow::ensure!(
            (1..=MAX_SESSION_MINUTES).contains(&session_max_age_minutes),
            "AUTH_SESSION_MAX_AGE_MINUTES must be between 1 and {MAX_SESSION_MINUTES}"
        );

        let auth = AuthConfig {
            secure_cookies: lookup("AUTH_SECURE_COOKIES")
                .and_then(|v| v.parse::<bool>().ok())
                .unwrap_or_else(|| base_url.starts_with("https://")),
            login_page: lookup("AUTH_LOGIN_PAGE").unwrap_or_else(|| "/login".into()),
            session_max_age_minutes,
            secret,
            base_url,
        };

        let github = GitHubConfig {
            client_id: required("GITHUB_CLIENT_ID")?,
            client_secret: required("GITHUB_CLIENT_SECRET")?,
            redirect_url: lookup("GITHUB_REDIRECT_URL")
                .unwrap_or_else(|| format!("{}/api/auth/callback/github", auth.base_url)),
        };

        Ok(Self {
            database_url,
            auth,
            github,
        })
    }
}
