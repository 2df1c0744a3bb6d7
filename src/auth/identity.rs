use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Token pair issued by the hosted identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

/// Successful credential check.
#[derive(Debug, Clone)]
pub struct SignIn {
    pub user_id: String,
    pub session: Option<HostedSession>,
}

/// Identity resolved from hosted session cookies. `refreshed` is set when the
/// access token had to be rotated.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: String,
    pub refreshed: Option<HostedSession>,
}

/// Result of an OAuth code exchange.
#[derive(Debug, Clone)]
pub struct OAuthSession {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub session: HostedSession,
}

#[derive(Debug, Clone, Default)]
pub struct SessionTokens<'a> {
    pub access_token: Option<&'a str>,
    pub refresh_token: Option<&'a str>,
}

/// Credential store and session authority. Selected once at startup.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn is_hosted(&self) -> bool;

    /// `Ok(None)` for unknown email or wrong password.
    async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Option<SignIn>>;

    /// Returns the id of the new identity.
    async fn create_identity(&self, email: &str, password: &str) -> anyhow::Result<String>;

    async fn delete_identity(&self, id: &str) -> anyhow::Result<()>;

    /// Hosted-session lookup; always `None` for providers without sessions.
    async fn resolve_session(&self, tokens: SessionTokens<'_>) -> Option<SessionUser>;

    async fn sign_out(&self, access_token: &str) -> anyhow::Result<()>;

    /// Google OAuth authorization URL (PKCE, plain challenge).
    fn authorize_url(&self, redirect_to: &str, code_verifier: &str) -> Option<String>;

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> anyhow::Result<OAuthSession>;
}
