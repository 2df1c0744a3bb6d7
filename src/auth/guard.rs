use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::info;

use super::{cookies::hosted_session_cookies, extractors::SessionContext};
use crate::{state::AppState, users::model::Profile};

pub const AUTH_REQUIRED_REDIRECT: &str = "/?error=authentication_required";
pub const ADMIN_REQUIRED_REDIRECT: &str = "/events?error=admin_access_required";

const PUBLIC_PATHS: &[&str] = &["/", "/register-user", "/events", "/health"];
const PUBLIC_PREFIXES: &[&str] = &[
    "/register/",
    "/api/",
    "/auth/callback",
    "/_next",
    "/static",
    "/images",
    "/favicon.ico",
    "/storage/",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Redirect(String),
}

pub fn is_public(path: &str) -> bool {
    PUBLIC_PATHS.contains(&path) || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p))
}

fn is_admin_path(path: &str) -> bool {
    path.starts_with("/admin")
}

/// Page-level access decision. API routes are public here and enforce access
/// in their own extractors.
pub fn decide(path: &str, profile: Option<&Profile>) -> GuardDecision {
    if is_public(path) {
        return GuardDecision::Allow;
    }
    match profile {
        None => GuardDecision::Redirect(AUTH_REQUIRED_REDIRECT.into()),
        Some(p) if is_admin_path(path) && !p.is_admin() => {
            GuardDecision::Redirect(ADMIN_REQUIRED_REDIRECT.into())
        }
        Some(_) => GuardDecision::Allow,
    }
}

/// Resolves the session once, applies the guard and hands the profile to
/// handlers through request extensions.
pub async fn session_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let resolved = state.resolver().resolve(req.headers()).await;
    let path = req.uri().path().to_owned();

    let mut response = match decide(&path, resolved.profile.as_ref()) {
        GuardDecision::Allow => {
            req.extensions_mut().insert(SessionContext(resolved.profile));
            next.run(req).await
        }
        GuardDecision::Redirect(to) => {
            info!(%path, redirect = %to, "route guard redirect");
            Redirect::to(&to).into_response()
        }
    };

    if let Some(session) = resolved.refreshed {
        let cookies = hosted_session_cookies(
            &session.access_token,
            &session.refresh_token,
            session.expires_in,
            state.config.cookie_secure,
        );
        for cookie in cookies {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }
    }
    response
}
