use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    auth::{github::GitHubProvider, provider::OAuthProvider},
    config::AppConfig,
    users::{PgUserStore, UserStore},
};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserStore>,
    pub config: Arc<AppConfig>,
    pub oauth: Arc<dyn OAuthProvider>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migration failed; continuing");
        }

        let oauth = Arc::new(GitHubProvider::new(&config.github).context("github oauth client")?)
            as Arc<dyn OAuthProvider>;
        let users = Arc::new(PgUserStore::new(db)) as Arc<dyn UserStore>;

        Ok(Self {
            users,
            config,
            oauth,
        })
    }

    #[cfg(test)]
    pub fn from_parts(
        users: Arc<dyn UserStore>,
        config: Arc<AppConfig>,
        oauth: Arc<dyn OAuthProvider>,
    ) -> Self {
        Self {
            users,
            config,
            oauth,
        }
    }
}
