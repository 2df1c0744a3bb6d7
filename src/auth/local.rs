use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    identity::{IdentityProvider, OAuthSession, SessionTokens, SessionUser, SignIn},
    password::{hash_password, verify_password},
};
use crate::users::memory::{
    DEMO_ADMIN_EMAIL, DEMO_ADMIN_ID, DEMO_PASSWORD, DEMO_USER_EMAIL, DEMO_USER_ID,
};

struct Credential {
    user_id: String,
    password_hash: String,
}

/// Argon2 credentials kept in process memory. Sessions are carried only by the
/// signed `auth-token` cookie.
pub struct LocalIdentity {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        Self { credentials: RwLock::new(HashMap::new()) }
    }

    /// Credentials for the demo accounts of `MemoryUserRepository::seeded`.
    pub fn seeded() -> anyhow::Result<Self> {
        let hash = hash_password(DEMO_PASSWORD)?;
        let identity = Self::new();
        {
            let mut creds = identity.credentials.write();
            for (email, id) in [(DEMO_ADMIN_EMAIL, DEMO_ADMIN_ID), (DEMO_USER_EMAIL, DEMO_USER_ID)] {
                creds.insert(
                    email.to_string(),
                    Credential { user_id: id.to_string(), password_hash: hash.clone() },
                );
            }
        }
        Ok(identity)
    }
}

impl Default for LocalIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentity {
    fn is_hosted(&self) -> bool {
        false
    }

    async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Option<SignIn>> {
        let (user_id, hash) = match self.credentials.read().get(&email.to_lowercase()) {
            Some(c) => (c.user_id.clone(), c.password_hash.clone()),
            None => return Ok(None),
        };
        if !verify_password(password, &hash)? {
            return Ok(None);
        }
        Ok(Some(SignIn { user_id, session: None }))
    }

    async fn create_identity(&self, email: &str, password: &str) -> anyhow::Result<String> {
        let key = email.to_lowercase();
        anyhow::ensure!(
            !self.credentials.read().contains_key(&key),
            "identity for {} already exists",
            key
        );
        let password_hash = hash_password(password)?;
        let user_id = Uuid::new_v4().to_string();

        let mut creds = self.credentials.write();
        anyhow::ensure!(!creds.contains_key(&key), "identity for {} already exists", key);
        creds.insert(key, Credential { user_id: user_id.clone(), password_hash });
        debug!(%user_id, "local identity created");
        Ok(user_id)
    }

    async fn delete_identity(&self, id: &str) -> anyhow::Result<()> {
        self.credentials.write().retain(|_, c| c.user_id != id);
        Ok(())
    }

    async fn resolve_session(&self, _tokens: SessionTokens<'_>) -> Option<SessionUser> {
        None
    }

    async fn sign_out(&self, _access_token: &str) -> anyhow::Result<()> {
        Ok(())
    }

    fn authorize_url(&self, _redirect_to: &str, _code_verifier: &str) -> Option<String> {
        None
    }

    async fn exchange_code(&self, _code: &str, _code_verifier: &str) -> anyhow::Result<OAuthSession> {
        anyhow::bail!("OAuth sign-in requires the hosted backend")
    }
}
