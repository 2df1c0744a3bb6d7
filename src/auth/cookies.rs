use axum::http::{header, HeaderMap, HeaderValue};

pub const AUTH_COOKIE: &str = "auth-token";
pub const HOSTED_ACCESS_COOKIE: &str = "hb-access-token";
pub const HOSTED_REFRESH_COOKIE: &str = "hb-refresh-token";
pub const PKCE_VERIFIER_COOKIE: &str = "oauth-code-verifier";

const HOSTED_REFRESH_MAX_AGE: u64 = 60 * 60 * 24 * 30;

pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

/// HttpOnly, SameSite=Lax cookie scoped to `/`.
pub fn session_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> HeaderValue {
    let secure = if secure { "; Secure" } else { "" };
    let raw = format!("{name}={value}; Max-Age={max_age_secs}; Path=/; HttpOnly; SameSite=Lax{secure}");
    HeaderValue::from_str(&raw).unwrap_or_else(|_| HeaderValue::from_static(""))
}

pub fn clear_cookie(name: &str) -> HeaderValue {
    let raw = format!(
        "{name}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/; HttpOnly; SameSite=Lax"
    );
    HeaderValue::from_str(&raw).unwrap_or_else(|_| HeaderValue::from_static(""))
}

/// Cookies carrying a hosted access/refresh pair.
pub fn hosted_session_cookies(
    access_token: &str,
    refresh_token: &str,
    expires_in: u64,
    secure: bool,
) -> [HeaderValue; 2] {
    [
        session_cookie(HOSTED_ACCESS_COOKIE, access_token, expires_in, secure),
        session_cookie(HOSTED_REFRESH_COOKIE, refresh_token, HOSTED_REFRESH_MAX_AGE, secure),
    ]
}
