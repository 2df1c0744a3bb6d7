use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::{
    auth::extractors::{AdminUser, CurrentUser, MaybeUser},
    error::AppError,
    events::{self, Event},
    state::AppState,
    users::{model::Profile, stats::RegistrationStats},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/health", get(|| async { "ok" }))
        .route("/admin", get(admin_dashboard))
        .route("/my-registrations", get(my_registrations))
        .route("/api/connection/status", get(connection_status))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Availability {
    pub is_open: bool,
    pub available_slots: usize,
    pub capacity: usize,
}

impl From<&RegistrationStats> for Availability {
    fn from(s: &RegistrationStats) -> Self {
        Self { is_open: !s.is_capacity_full, available_slots: s.available_slots, capacity: s.capacity }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HomePage {
    pub featured_event: Option<&'static Event>,
    pub registration: Availability,
    pub user: Option<Profile>,
}

/// Landing data: the featured event and whether registration is still open.
pub async fn home(State(state): State<AppState>, MaybeUser(user): MaybeUser) -> Result<Json<HomePage>, AppError> {
    let stats = state.users.stats().await?;
    Ok(Json(HomePage {
        featured_event: events::featured(),
        registration: Availability::from(&stats),
        user,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPage {
    pub admin: Profile,
    pub stats: RegistrationStats,
    pub users: Vec<Profile>,
}

pub async fn admin_dashboard(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> Result<Json<AdminPage>, AppError> {
    let directory = state.directory();
    let stats = directory.stats().await?;
    let mut users = directory.list_all().await?;
    users.reverse();
    Ok(Json(AdminPage { admin, stats, users }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyRegistrations {
    pub user: Profile,
    pub events: &'static [Event],
}

pub async fn my_registrations(CurrentUser(user): CurrentUser) -> Json<MyRegistrations> {
    Json(MyRegistrations { user, events: &events::EVENTS })
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub enabled: bool,
    pub connected: bool,
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn connection_status(State(state): State<AppState>) -> Json<ConnectionStatus> {
    if !state.identity.is_hosted() {
        return Json(ConnectionStatus {
            enabled: false,
            connected: false,
            message: "Hosted backend is disabled",
            error: None,
        });
    }
    match state.users.ping().await {
        Ok(()) => Json(ConnectionStatus {
            enabled: true,
            connected: true,
            message: "Successfully connected to hosted backend",
            error: None,
        }),
        Err(e) => {
            warn!(error = %e, "hosted backend ping failed");
            Json(ConnectionStatus {
                enabled: true,
                connected: false,
                message: "Connection test failed",
                error: Some(e.to_string()),
            })
        }
    }
}
