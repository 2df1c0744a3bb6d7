use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch},
    Json, Router,
};
use tracing::{instrument, warn};

use super::{
    dto::{Registration, StatusUpdate, StatusUpdateResponse, UserListResponse, UserResponse},
    model::UserStatus,
};
use crate::{auth::extractors::AdminUser, error::AppError, state::AppState};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/api/users", get(list_users).post(register))
        .route("/api/users/:id/status", patch(update_status))
}

/// All profiles, most recent registration first.
#[instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<UserListResponse>, AppError> {
    let mut users = state.directory().list_all().await?;
    users.reverse();
    let total = users.len();
    Ok(Json(UserListResponse { success: true, users, total }))
}

#[instrument(skip(state, payload), fields(email = %payload.email))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<Registration>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = state.directory().register(payload).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { success: true, user })))
}

#[instrument(skip(state, admin, payload), fields(admin_id = %admin.0.id))]
pub async fn update_status(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdate>,
) -> Result<Json<StatusUpdateResponse>, AppError> {
    let status: UserStatus = payload.status.parse().map_err(|_| {
        warn!(status = %payload.status, "invalid status");
        AppError::BadRequest("Invalid status".into())
    })?;

    if !state.directory().update_status(&id, status).await? {
        return Err(AppError::NotFound("User not found".into()));
    }
    Ok(Json(StatusUpdateResponse {
        success: true,
        message: format!("User status updated to {status}"),
    }))
}
