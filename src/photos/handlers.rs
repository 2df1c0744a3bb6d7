use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{instrument, warn};

use super::services::{self, PhotoEntry, UploadError, UploadItem, UploadedPhoto};
use crate::{
    auth::extractors::{CurrentUser, MaybeUser},
    error::AppError,
    state::AppState,
};

/// Multipart framing on top of the largest accepted photo.
const UPLOAD_BODY_LIMIT: usize = 10 * 1024 * 1024;

pub fn photo_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/upload/photo",
            get(list_photos).post(upload_photo).delete(delete_photo),
        )
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
        .route("/storage/*key", get(serve_object))
}

impl From<UploadError> for AppError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Rejected(msg) => AppError::BadRequest(msg),
            UploadError::Storage(inner) => AppError::Upstream(format!("{inner:#}")),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    #[serde(flatten)]
    pub photo: UploadedPhoto,
    pub file_name: String,
    pub file_size: usize,
    pub file_type: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: UploadData,
}

#[derive(Debug, Serialize)]
pub struct PhotoListResponse {
    pub success: bool,
    pub photos: Vec<PhotoEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoQuery {
    pub user_id: Option<String>,
    pub path: Option<String>,
}

struct PhotoForm {
    body: Bytes,
    file_name: String,
    content_type: String,
    user_id: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<Option<PhotoForm>, AppError> {
    let mut photo = None;
    let mut user_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        match field.name() {
            Some("photo") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let body = field.bytes().await.map_err(|e| AppError::BadRequest(e.body_text()))?;
                photo = Some((body, file_name, content_type));
            }
            Some("userId") => {
                let v = field.text().await.map_err(|e| AppError::BadRequest(e.body_text()))?;
                user_id = Some(v.trim().to_string()).filter(|s| !s.is_empty());
            }
            _ => {}
        }
    }

    Ok(photo.map(|(body, file_name, content_type)| PhotoForm { body, file_name, content_type, user_id }))
}

/// Stores under the caller's own folder; admins may name another user.
/// Anonymous uploads land in `public/`.
#[instrument(skip_all)]
pub async fn upload_photo(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let Some(form) = read_form(multipart).await? else {
        return Err(AppError::BadRequest("No photo file provided".into()));
    };

    let owner = match &caller {
        Some(p) if p.is_admin() => form.user_id.clone().or_else(|| Some(p.id.clone())),
        Some(p) => {
            if form.user_id.as_deref().is_some_and(|id| id != p.id) {
                warn!(caller = %p.id, "ignoring userId from non-admin upload");
            }
            Some(p.id.clone())
        }
        None => None,
    };

    let file_size = form.body.len();
    let photo = services::upload(
        state.storage.as_ref(),
        UploadItem {
            body: form.body,
            file_name: &form.file_name,
            content_type: &form.content_type,
        },
        owner.as_deref(),
    )
    .await?;

    Ok(Json(UploadResponse {
        success: true,
        message: "Photo uploaded successfully",
        data: UploadData {
            photo,
            file_name: form.file_name,
            file_size,
            file_type: form.content_type,
        },
    }))
}

#[instrument(skip_all, fields(caller = %user.id))]
pub async fn list_photos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<PhotoQuery>,
) -> Result<Json<PhotoListResponse>, AppError> {
    let target = match q.user_id {
        Some(id) if id != user.id => {
            if !user.is_admin() {
                return Err(AppError::Forbidden);
            }
            id
        }
        _ => user.id.clone(),
    };
    let photos = services::list_user_photos(state.storage.as_ref(), &target).await?;
    Ok(Json(PhotoListResponse { success: true, photos }))
}

#[instrument(skip_all, fields(caller = %user.id))]
pub async fn delete_photo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(q): Query<PhotoQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let path = q
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Photo path is required".into()))?;

    if !user.is_admin() && !path.starts_with(&services::user_prefix(&user.id)) {
        warn!(%path, "delete outside own folder");
        return Err(AppError::Forbidden);
    }
    services::delete(state.storage.as_ref(), &path).await?;
    Ok(Json(json!({ "success": true })))
}

/// Serves stored objects when no public object-store URL fronts them.
pub async fn serve_object(State(state): State<AppState>, Path(key): Path<String>) -> Result<Response, AppError> {
    match state.storage.get_object(&key).await? {
        Some((body, content_type)) => Ok((
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "max-age=3600".to_string()),
            ],
            body,
        )
            .into_response()),
        None => Err(AppError::NotFound("Not found".into())),
    }
}
