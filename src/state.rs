use std::sync::Arc;

use anyhow::Context;
use crate::auth::{
    hosted::HostedIdentity, identity::IdentityProvider, jwt::JwtKeys, local::LocalIdentity,
    session::SessionResolver,
};
use crate::config::AppConfig;
use crate::storage::{MemoryStorage, Storage, StorageClient};
use crate::users::{
    directory::UserDirectory, memory::MemoryUserRepository, pg::PgUserRepository,
    repo::UserRepository,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: Arc<dyn UserRepository>,
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    /// Chooses the hosted or in-memory backend once for the whole process.
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let (users, identity): (Arc<dyn UserRepository>, Arc<dyn IdentityProvider>) =
            match &config.hosted {
                Some(hosted) => {
                    let db = sqlx::postgres::PgPoolOptions::new()
                        .max_connections(10)
                        .connect(&hosted.database_url)
                        .await
                        .context("connect to hosted database")?;

                    if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
                        tracing::warn!(error = %e, "migration failed; continuing");
                    }

                    tracing::info!(url = %hosted.url, "using hosted backend");
                    (
                        Arc::new(PgUserRepository::new(db)),
                        Arc::new(HostedIdentity::new(hosted)?),
                    )
                }
                None => {
                    tracing::warn!("hosted backend disabled; using in-memory users with demo accounts");
                    (
                        Arc::new(MemoryUserRepository::seeded()),
                        Arc::new(LocalIdentity::seeded()?),
                    )
                }
            };

        let storage: Arc<dyn StorageClient> = match &config.storage {
            Some(cfg) => Arc::new(Storage::new(cfg).await?),
            None => {
                tracing::warn!("object storage not configured; photos are kept in memory");
                Arc::new(MemoryStorage::new(format!("http://localhost:{}/storage", config.port)))
            }
        };

        Ok(Self { config, users, identity, storage })
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserRepository>,
        identity: Arc<dyn IdentityProvider>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        Self { config, users, identity, storage }
    }

    pub fn directory(&self) -> UserDirectory {
        UserDirectory::new(self.users.clone(), self.identity.clone())
    }

    pub fn resolver(&self) -> SessionResolver {
        SessionResolver::new(self.users.clone(), self.identity.clone(), JwtKeys::from(&self.config.jwt))
    }

    /// In-memory backend with demo profiles but no stored credentials.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(AppConfig::for_tests()),
            Arc::new(MemoryUserRepository::seeded()),
            Arc::new(LocalIdentity::new()),
            Arc::new(MemoryStorage::new("http://localhost/storage")),
        )
    }
}
