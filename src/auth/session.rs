use std::sync::Arc;

use axum::http::HeaderMap;
use tracing::{debug, warn};

use super::{
    cookies::{read_cookie, AUTH_COOKIE, HOSTED_ACCESS_COOKIE, HOSTED_REFRESH_COOKIE},
    identity::{HostedSession, IdentityProvider, SessionTokens},
    jwt::JwtKeys,
};
use crate::users::{model::Profile, repo::UserRepository};

#[derive(Debug, Clone, Default)]
pub struct ResolvedSession {
    pub profile: Option<Profile>,
    /// Rotated hosted tokens that must be written back as cookies.
    pub refreshed: Option<HostedSession>,
}

/// Turns request cookies into the caller's profile. Never fails: every problem
/// along the way resolves to an anonymous caller.
pub struct SessionResolver {
    users: Arc<dyn UserRepository>,
    identity: Arc<dyn IdentityProvider>,
    keys: JwtKeys,
}

impl SessionResolver {
    pub fn new(users: Arc<dyn UserRepository>, identity: Arc<dyn IdentityProvider>, keys: JwtKeys) -> Self {
        Self { users, identity, keys }
    }

    pub async fn resolve(&self, headers: &HeaderMap) -> ResolvedSession {
        if self.identity.is_hosted() {
            if let Some(resolved) = self.resolve_hosted(headers).await {
                return resolved;
            }
        }

        let profile = match read_cookie(headers, AUTH_COOKIE) {
            Some(token) => self.resolve_local(token).await,
            None => None,
        };
        ResolvedSession { profile, refreshed: None }
    }

    async fn resolve_hosted(&self, headers: &HeaderMap) -> Option<ResolvedSession> {
        let tokens = SessionTokens {
            access_token: read_cookie(headers, HOSTED_ACCESS_COOKIE),
            refresh_token: read_cookie(headers, HOSTED_REFRESH_COOKIE),
        };
        if tokens.access_token.is_none() && tokens.refresh_token.is_none() {
            return None;
        }

        let user = self.identity.resolve_session(tokens).await?;
        let profile = self.load_profile(&user.user_id).await?;
        Some(ResolvedSession { profile: Some(profile), refreshed: user.refreshed })
    }

    async fn resolve_local(&self, token: &str) -> Option<Profile> {
        let claims = match self.keys.verify(token) {
            Ok(c) => c,
            Err(e) => {
                debug!(error = %e, "session token rejected");
                return None;
            }
        };
        self.load_profile(&claims.user_id).await
    }

    async fn load_profile(&self, user_id: &str) -> Option<Profile> {
        match self.users.find_by_id(user_id).await {
            Ok(Some(p)) => Some(p),
            Ok(None) => {
                debug!(%user_id, "session refers to unknown profile");
                None
            }
            Err(e) => {
                warn!(error = %e, %user_id, "profile lookup failed during session resolution");
                None
            }
        }
    }
}
