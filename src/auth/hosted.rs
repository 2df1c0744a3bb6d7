use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::identity::{
    HostedSession, IdentityProvider, OAuthSession, SessionTokens, SessionUser, SignIn,
};
use crate::config::HostedConfig;

#[derive(Debug, Deserialize)]
struct HostedUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(flatten)]
    session: HostedSession,
    user: HostedUser,
}

/// Client for the hosted identity service (GoTrue-compatible REST API).
pub struct HostedIdentity {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    service_role_key: String,
}

impl HostedIdentity {
    pub fn new(cfg: &HostedConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("alumni/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build http client")?;
        Ok(Self {
            http,
            base_url: format!("{}/auth/v1", cfg.url.trim_end_matches('/')),
            anon_key: cfg.anon_key.clone(),
            service_role_key: cfg.service_role_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `Ok(None)` when the service rejects the grant (bad credentials, stale
    /// refresh token, used code).
    async fn token(&self, grant_type: &str, body: serde_json::Value) -> anyhow::Result<Option<TokenResponse>> {
        let resp = self
            .http
            .post(self.url("/token"))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("token grant {grant_type}"))?;

        match resp.status() {
            s if s.is_success() => Ok(Some(resp.json().await.context("decode token response")?)),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => {
                let message = upstream_message(resp).await;
                debug!(grant_type, %message, "grant rejected");
                Ok(None)
            }
            _ => {
                let message = upstream_message(resp).await;
                anyhow::bail!(message)
            }
        }
    }

    async fn current_user(&self, access_token: &str) -> anyhow::Result<Option<HostedUser>> {
        let resp = self
            .http
            .get(self.url("/user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .context("get session user")?;
        if resp.status().is_success() {
            return Ok(Some(resp.json().await.context("decode session user")?));
        }
        if resp.status().is_client_error() {
            return Ok(None);
        }
        anyhow::bail!(upstream_message(resp).await)
    }
}

async fn upstream_message(resp: Response) -> String {
    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    ["msg", "message", "error_description", "error"]
        .iter()
        .find_map(|k| body.get(*k).and_then(|v| v.as_str()))
        .map(str::to_string)
        .unwrap_or_else(|| format!("identity service responded {status}"))
}

#[async_trait]
impl IdentityProvider for HostedIdentity {
    fn is_hosted(&self) -> bool {
        true
    }

    async fn sign_in(&self, email: &str, password: &str) -> anyhow::Result<Option<SignIn>> {
        let grant = self
            .token("password", json!({ "email": email, "password": password }))
            .await?;
        Ok(grant.map(|t| SignIn { user_id: t.user.id, session: Some(t.session) }))
    }

    async fn create_identity(&self, email: &str, password: &str) -> anyhow::Result<String> {
        let resp = self
            .http
            .post(self.url("/admin/users"))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&json!({ "email": email, "password": password, "email_confirm": true }))
            .send()
            .await
            .context("create identity")?;
        if !resp.status().is_success() {
            anyhow::bail!(upstream_message(resp).await);
        }
        let user: HostedUser = resp.json().await.context("decode created identity")?;
        Ok(user.id)
    }

    async fn delete_identity(&self, id: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/admin/users/{id}")))
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .send()
            .await
            .context("delete identity")?;
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            anyhow::bail!(upstream_message(resp).await);
        }
        Ok(())
    }

    async fn resolve_session(&self, tokens: SessionTokens<'_>) -> Option<SessionUser> {
        if let Some(access) = tokens.access_token {
            match self.current_user(access).await {
                Ok(Some(user)) => return Some(SessionUser { user_id: user.id, refreshed: None }),
                Ok(None) => debug!("hosted access token rejected"),
                Err(e) => {
                    warn!(error = %e, "hosted session lookup failed");
                    return None;
                }
            }
        }

        let refresh = tokens.refresh_token?;
        match self.token("refresh_token", json!({ "refresh_token": refresh })).await {
            Ok(Some(t)) => {
                debug!(user_id = %t.user.id, "hosted session refreshed");
                Some(SessionUser { user_id: t.user.id, refreshed: Some(t.session) })
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "hosted session refresh failed");
                None
            }
        }
    }

    async fn sign_out(&self, access_token: &str) -> anyhow::Result<()> {
        let resp = self
            .http
            .post(self.url("/logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .context("hosted sign out")?;
        if !resp.status().is_success() && !resp.status().is_client_error() {
            anyhow::bail!(upstream_message(resp).await);
        }
        Ok(())
    }

    fn authorize_url(&self, redirect_to: &str, code_verifier: &str) -> Option<String> {
        Some(format!(
            "{}?provider=google&redirect_to={}&code_challenge={}&code_challenge_method=plain\
             &access_type=offline&prompt=consent",
            self.url("/authorize"),
            urlencoding::encode(redirect_to),
            urlencoding::encode(code_verifier),
        ))
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> anyhow::Result<OAuthSession> {
        let t = self
            .token("pkce", json!({ "auth_code": code, "code_verifier": code_verifier }))
            .await?
            .context("authorization code was rejected")?;

        let full_name = ["full_name", "name"]
            .iter()
            .find_map(|k| t.user.user_metadata.get(*k).and_then(|v| v.as_str()))
            .map(str::to_string);
        Ok(OAuthSession {
            email: t.user.email.context("identity has no email")?,
            user_id: t.user.id,
            full_name,
            session: t.session,
        })
    }
}
