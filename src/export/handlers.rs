use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use time::{macros::format_description, OffsetDateTime};
use tracing::{info, instrument};

use super::services::{file_timestamp, to_csv, CsvSchema, ExportFilters};
use crate::{auth::extractors::AdminUser, error::AppError, state::AppState, users::model::Profile};

pub fn export_routes() -> Router<AppState> {
    Router::new().route("/api/export/users", get(export_all).post(export_filtered))
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub schema: Option<CsvSchema>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub filters: ExportFilters,
    #[serde(default)]
    pub format: ExportFormat,
    pub schema: Option<CsvSchema>,
}

fn file_name(schema: CsvSchema, filtered: bool) -> Result<String, AppError> {
    let now = OffsetDateTime::now_utc();
    Ok(match (schema, filtered) {
        (CsvSchema::Summary, _) => {
            let day = now.date().format(format_description!("[year]-[month]-[day]")).map_err(anyhow::Error::from)?;
            format!("alumni-users-{day}.csv")
        }
        (CsvSchema::Full, true) => format!("filtered-users-{}.csv", file_timestamp(now)?),
        (CsvSchema::Full, false) => format!("user-registrations-{}.csv", file_timestamp(now)?),
    })
}

fn csv_response(profiles: &[Profile], schema: CsvSchema, filtered: bool) -> Result<Response, AppError> {
    let body = to_csv(profiles, schema)?;
    let disposition = format!("attachment; filename=\"{}\"", file_name(schema, filtered)?);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        body,
    )
        .into_response())
}

/// Every profile in creation order.
#[instrument(skip_all, fields(admin = %admin.0.id))]
pub async fn export_all(
    State(state): State<AppState>,
    admin: AdminUser,
    Query(q): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let profiles = ExportFilters::default().apply(state.directory().list_all().await?)?;
    if profiles.is_empty() {
        return Err(AppError::NotFound("No user data found".into()));
    }
    let schema = q.schema.unwrap_or_default();
    info!(count = profiles.len(), ?schema, "exporting users");
    csv_response(&profiles, schema, false)
}

#[instrument(skip_all, fields(admin = %admin.0.id))]
pub async fn export_filtered(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(req): Json<ExportRequest>,
) -> Result<Response, AppError> {
    let profiles = req
        .filters
        .apply(state.directory().list_all().await?)
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    if profiles.is_empty() {
        return Err(AppError::NotFound("No users found matching the filters".into()));
    }

    info!(count = profiles.len(), format = ?req.format, "exporting filtered users");
    match req.format {
        ExportFormat::Json => Ok(Json(json!({
            "success": true,
            "count": profiles.len(),
            "data": profiles,
        }))
        .into_response()),
        ExportFormat::Csv => csv_response(&profiles, req.schema.unwrap_or_default(), !req.filters.is_empty()),
    }
}
