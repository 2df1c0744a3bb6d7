use async_trait::async_trait;

use super::{
    model::{NewProfile, Profile, UserStatus},
    stats::RegistrationStats,
};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Invalid email")]
    InvalidEmail,
    #[error("Name is required")]
    MissingName,
    #[error("Password must be at least 8 characters")]
    WeakPassword,
    #[error("User with this email already exists.")]
    DuplicateEmail,
    #[error("Registration capacity reached. Maximum {0} users allowed.")]
    CapacityReached(usize),
    #[error("{0}")]
    Backend(#[from] anyhow::Error),
}

/// Profile persistence. One implementation is selected at startup and shared
/// by every request for the lifetime of the process.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Profile>>;
    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Profile>>;

    /// Insert a profile, minting its unique id. Rejects duplicate emails and
    /// insertions past capacity.
    async fn insert(&self, profile: NewProfile) -> Result<Profile, DirectoryError>;

    /// Returns `false` when no member profile with `id` exists.
    async fn update_status(&self, id: &str, status: UserStatus) -> anyhow::Result<bool>;

    /// All profiles in registration order.
    async fn list_all(&self) -> anyhow::Result<Vec<Profile>>;

    async fn stats(&self) -> anyhow::Result<RegistrationStats>;

    async fn ping(&self) -> anyhow::Result<()>;
}
