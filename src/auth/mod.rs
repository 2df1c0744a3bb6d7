use crate::state::AppState;
use axum::Router;

pub mod cookies;
mod dto;
pub mod extractors;
pub mod guard;
pub mod handlers;
pub mod hosted;
pub mod identity;
pub mod jwt;
pub mod local;
pub mod password;
pub mod session;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
