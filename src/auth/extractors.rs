use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use crate::{error::AppError, state::AppState, users::model::Profile};

/// Session resolved by the middleware, stored in request extensions.
#[derive(Debug, Clone, Default)]
pub struct SessionContext(pub Option<Profile>);

async fn session_profile(parts: &mut Parts, state: &AppState) -> Option<Profile> {
    if let Some(ctx) = parts.extensions.get::<SessionContext>() {
        return ctx.0.clone();
    }
    // Routers mounted without the middleware resolve on demand.
    let profile = state.resolver().resolve(&parts.headers).await.profile;
    parts.extensions.insert(SessionContext(profile.clone()));
    profile
}

/// Caller's profile, or `None` for anonymous requests.
pub struct MaybeUser(pub Option<Profile>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(session_profile(parts, state).await))
    }
}

/// Authenticated caller; 401 otherwise.
pub struct CurrentUser(pub Profile);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        session_profile(parts, state)
            .await
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

/// Authenticated admin; 403 for anyone else.
pub struct AdminUser(pub Profile);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match session_profile(parts, state).await {
            Some(p) if p.is_admin() => Ok(AdminUser(p)),
            Some(p) => {
                warn!(user_id = %p.id, path = %parts.uri.path(), "non-admin on admin endpoint");
                Err(AppError::Forbidden)
            }
            None => Err(AppError::Forbidden),
        }
    }
}
