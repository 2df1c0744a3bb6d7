use axum::{
    extract::{FromRef, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use rand::{distributions::Alphanumeric, Rng};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use super::{
    cookies::{
        clear_cookie, hosted_session_cookies, read_cookie, session_cookie, AUTH_COOKIE,
        HOSTED_ACCESS_COOKIE, HOSTED_REFRESH_COOKIE, PKCE_VERIFIER_COOKIE,
    },
    dto::{CallbackParams, LoginRequest, LoginResponse, MeResponse, OAuthUrlResponse, StatsResponse},
    extractors::{AdminUser, CurrentUser},
    identity::HostedSession,
    jwt::JwtKeys,
};
use crate::{error::AppError, state::AppState, users::model::Profile};

const PKCE_VERIFIER_MAX_AGE: u64 = 10 * 60;
const PKCE_VERIFIER_LEN: usize = 64;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/auth/stats", get(stats))
        .route("/api/auth/google", post(google))
        .route("/auth/callback", get(oauth_callback))
}

/// Sets the local session cookie (and hosted cookies when available) for `profile`.
fn session_headers(
    state: &AppState,
    profile: &Profile,
    hosted: Option<&HostedSession>,
) -> Result<(HeaderMap, String), AppError> {
    let keys = JwtKeys::from_ref(state);
    let secure = state.config.cookie_secure;
    let token = keys.sign(&profile.id, profile.role)?;

    let mut headers = HeaderMap::new();
    headers.append(
        header::SET_COOKIE,
        session_cookie(AUTH_COOKIE, &token, keys.max_age_secs(), secure),
    );
    if let Some(s) = hosted {
        for c in hosted_session_cookies(&s.access_token, &s.refresh_token, s.expires_in, secure) {
            headers.append(header::SET_COOKIE, c);
        }
    }
    Ok((headers, token))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Email and password are required".into()));
    }

    let Some(signed_in) = state.identity.sign_in(&email, &payload.password).await? else {
        warn!(%email, "login rejected");
        return Err(AppError::InvalidCredentials);
    };

    let Some(profile) = state.users.find_by_id(&signed_in.user_id).await? else {
        warn!(user_id = %signed_in.user_id, "identity has no profile");
        return Err(AppError::InvalidCredentials);
    };

    let (headers, token) = session_headers(&state, &profile, signed_in.session.as_ref())?;
    info!(user_id = %profile.id, role = %profile.role, "user logged in");
    Ok((headers, Json(LoginResponse { success: true, user: profile, token })).into_response())
}

#[instrument(skip(state, headers))]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if state.identity.is_hosted() {
        if let Some(access) = read_cookie(&headers, HOSTED_ACCESS_COOKIE) {
            if let Err(e) = state.identity.sign_out(access).await {
                warn!(error = %e, "hosted sign out failed");
            }
        }
    }

    let mut out = HeaderMap::new();
    for name in [AUTH_COOKIE, HOSTED_ACCESS_COOKIE, HOSTED_REFRESH_COOKIE] {
        out.append(header::SET_COOKIE, clear_cookie(name));
    }
    (out, Json(json!({ "success": true }))).into_response()
}

pub async fn me(CurrentUser(user): CurrentUser) -> Json<MeResponse> {
    Json(MeResponse { success: true, user })
}

#[instrument(skip_all)]
pub async fn stats(State(state): State<AppState>, _admin: AdminUser) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.users.stats().await?;
    Ok(Json(StatsResponse { success: true, stats }))
}

/// Origin the browser used, for building the OAuth return address.
fn request_origin(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        return origin.trim_end_matches('/').to_string();
    }
    let scheme = if state.config.cookie_secure { "https" } else { "http" };
    match headers.get(header::HOST).and_then(|v| v.to_str().ok()) {
        Some(host) => format!("{scheme}://{host}"),
        None => format!("{scheme}://localhost:{}", state.config.port),
    }
}

#[instrument(skip_all)]
pub async fn google(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, AppError> {
    if !state.identity.is_hosted() {
        return Err(AppError::Unavailable("Google sign-in requires the hosted backend".into()));
    }

    let verifier: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PKCE_VERIFIER_LEN)
        .map(char::from)
        .collect();
    let redirect_to = format!("{}/auth/callback", request_origin(&headers, &state));

    let url = state
        .identity
        .authorize_url(&redirect_to, &verifier)
        .ok_or_else(|| AppError::Unavailable("Google sign-in is not available".into()))?;

    let cookie = session_cookie(
        PKCE_VERIFIER_COOKIE,
        &verifier,
        PKCE_VERIFIER_MAX_AGE,
        state.config.cookie_secure,
    );
    info!(%redirect_to, "oauth flow started");
    Ok(([(header::SET_COOKIE, cookie)], Json(OAuthUrlResponse { url })).into_response())
}

fn callback_error(code: &str, details: &str) -> Response {
    let to = format!("/?error={code}&details={}", urlencoding::encode(details));
    let mut resp = Redirect::to(&to).into_response();
    resp.headers_mut()
        .append(header::SET_COOKIE, clear_cookie(PKCE_VERIFIER_COOKIE));
    resp
}

/// OAuth return address: exchanges the code, creates the profile on first
/// sign-in and lands on the events page.
#[instrument(skip_all)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(err) = params.error {
        let details = params.error_description.unwrap_or_else(|| err.clone());
        warn!(error = %err, %details, "identity provider returned an error");
        return callback_error("oauth_provider_error", &details);
    }
    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return callback_error("no_auth_code", "No authorization code received");
    };
    if !state.identity.is_hosted() {
        return callback_error("oauth_unavailable", "Hosted backend is not enabled");
    }
    let Some(verifier) = read_cookie(&headers, PKCE_VERIFIER_COOKIE) else {
        return callback_error("code_exchange_failed", "Missing code verifier");
    };

    let oauth = match state.identity.exchange_code(&code, verifier).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "oauth code exchange failed");
            return callback_error("code_exchange_failed", &e.to_string());
        }
    };

    let profile = match state.directory().ensure_oauth_profile(&oauth).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, user_id = %oauth.user_id, "oauth profile creation failed");
            return callback_error("profile_creation_failed", &e.to_string());
        }
    };

    match session_headers(&state, &profile, Some(&oauth.session)) {
        Ok((mut cookies, _)) => {
            cookies.append(header::SET_COOKIE, clear_cookie(PKCE_VERIFIER_COOKIE));
            info!(user_id = %profile.id, "oauth sign-in complete");
            (cookies, Redirect::to("/events")).into_response()
        }
        Err(e) => e.into_response(),
    }
}
