use crate::state::AppState;
use axum::Router;

pub mod callbacks;
pub mod claims;
mod cookies;
pub mod dto;
pub(crate) mod extractors;
pub mod github;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod provider;
pub mod session;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}

pub fn me_router() -> Router<AppState> {
    handlers::me_routes()
}
