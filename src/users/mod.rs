use crate::state::AppState;
use axum::Router;

pub mod directory;
pub mod dto;
pub mod handlers;
pub mod memory;
pub mod model;
pub mod pg;
pub mod repo;
pub mod stats;

pub fn router() -> Router<AppState> {
    handlers::user_routes()
}
