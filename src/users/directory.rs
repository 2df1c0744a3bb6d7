use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, warn};

use super::{
    dto::Registration,
    model::{NewProfile, Profile, Role, UserStatus},
    repo::{DirectoryError, UserRepository},
    stats::RegistrationStats,
};
use crate::auth::{
    identity::{IdentityProvider, OAuthSession},
    password::meets_policy,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn blank_to_none(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Profile operations on top of the injected repository and identity provider.
#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn UserRepository>,
    identity: Arc<dyn IdentityProvider>,
}

impl UserDirectory {
    pub fn new(users: Arc<dyn UserRepository>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { users, identity }
    }

    /// Self-service registration. Creates the login identity first, then the
    /// profile; a failed profile insert deletes the identity again.
    pub async fn register(&self, reg: Registration) -> Result<Profile, DirectoryError> {
        let email = reg.email.trim().to_lowercase();
        let name = reg.name.trim().to_string();
        if !is_valid_email(&email) {
            return Err(DirectoryError::InvalidEmail);
        }
        if name.is_empty() {
            return Err(DirectoryError::MissingName);
        }
        if !meets_policy(&reg.password) {
            return Err(DirectoryError::WeakPassword);
        }

        if self.users.find_by_email(&email).await?.is_some() {
            warn!(%email, "email already registered");
            return Err(DirectoryError::DuplicateEmail);
        }
        let stats = self.users.stats().await?;
        if stats.is_capacity_full {
            warn!(capacity = stats.capacity, "registration capacity reached");
            return Err(DirectoryError::CapacityReached(stats.capacity));
        }

        let user_id = self.identity.create_identity(&email, &reg.password).await?;

        let new = NewProfile {
            id: user_id.clone(),
            email,
            name,
            role: Role::User,
            batch: blank_to_none(reg.batch),
            department: blank_to_none(reg.department),
            phone: blank_to_none(reg.phone),
            address: blank_to_none(reg.address),
            year_of_passing: blank_to_none(reg.year_of_passing),
        };

        match self.users.insert(new).await {
            Ok(profile) => {
                info!(user_id = %profile.id, unique_id = ?profile.unique_id, "user registered");
                Ok(profile)
            }
            Err(e) => {
                warn!(error = %e, %user_id, "profile insert failed; removing identity");
                if let Err(cleanup) = self.identity.delete_identity(&user_id).await {
                    error!(error = %cleanup, %user_id, "orphaned identity could not be deleted");
                }
                Err(e)
            }
        }
    }

    /// First OAuth sign-in creates the member profile; later sign-ins return it.
    pub async fn ensure_oauth_profile(&self, oauth: &OAuthSession) -> Result<Profile, DirectoryError> {
        if let Some(existing) = self.users.find_by_id(&oauth.user_id).await? {
            return Ok(existing);
        }
        let name = oauth
            .full_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| oauth.email.split('@').next().unwrap_or_default().to_string());

        let profile = self
            .users
            .insert(NewProfile {
                id: oauth.user_id.clone(),
                email: oauth.email.to_lowercase(),
                name,
                role: Role::User,
                batch: None,
                department: None,
                phone: None,
                address: None,
                year_of_passing: None,
            })
            .await?;
        info!(user_id = %profile.id, "profile created from oauth sign-in");
        Ok(profile)
    }

    pub async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Profile>> {
        self.users.find_by_email(&email.trim().to_lowercase()).await
    }

    pub async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Profile>> {
        self.users.find_by_id(id).await
    }

    pub async fn update_status(&self, id: &str, status: UserStatus) -> anyhow::Result<bool> {
        let updated = self.users.update_status(id, status).await?;
        if updated {
            info!(user_id = %id, %status, "user status updated");
        }
        Ok(updated)
    }

    pub async fn list_all(&self) -> anyhow::Result<Vec<Profile>> {
        self.users.list_all().await
    }

    pub async fn stats(&self) -> anyhow::Result<RegistrationStats> {
        self.users.stats().await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::auth::{identity::HostedSession, local::LocalIdentity};
    use crate::users::{
        memory::{new_member, MemoryUserRepository, DEMO_USER_EMAIL},
        stats::REGISTRATION_CAPACITY,
    };

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Kavya Sharma".into(),
            email: email.into(),
            password: "reunion-2025".into(),
            phone: Some("+91 90000 00000".into()),
            address: Some("  ".into()),
            batch: Some("2005-2010".into()),
            department: Some("Mathematics".into()),
            year_of_passing: Some("2010".into()),
        }
    }

    fn directory(repo: Arc<MemoryUserRepository>, idp: Arc<LocalIdentity>) -> UserDirectory {
        UserDirectory::new(repo, idp)
    }

    #[tokio::test]
    async fn registered_user_is_discoverable_and_listed() {
        let repo = Arc::new(MemoryUserRepository::seeded());
        let idp = Arc::new(LocalIdentity::new());
        let dir = directory(repo, idp.clone());

        let profile = dir.register(registration("Kavya@Example.com")).await.unwrap();
        assert_eq!(profile.email, "kavya@example.com");
        assert_eq!(profile.address, None);
        assert_eq!(profile.status, UserStatus::Active);

        let found = dir.find_by_email("kavya@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, profile.id);
        assert!(dir.list_all().await.unwrap().iter().any(|p| p.id == profile.id));

        let signed_in = idp.sign_in("kavya@example.com", "reunion-2025").await.unwrap().unwrap();
        assert_eq!(signed_in.user_id, profile.id);
    }

    #[tokio::test]
    async fn rejects_invalid_input_before_touching_backends() {
        let dir = directory(Arc::new(MemoryUserRepository::seeded()), Arc::new(LocalIdentity::new()));

        let err = dir.register(registration("not-an-email")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidEmail));

        let mut short = registration("short@example.com");
        short.password = "1234".into();
        assert!(matches!(dir.register(short).await.unwrap_err(), DirectoryError::WeakPassword));

        let mut nameless = registration("nameless@example.com");
        nameless.name = " ".into();
        assert!(matches!(dir.register(nameless).await.unwrap_err(), DirectoryError::MissingName));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let dir = directory(Arc::new(MemoryUserRepository::seeded()), Arc::new(LocalIdentity::new()));
        let err = dir.register(registration(DEMO_USER_EMAIL)).await.unwrap_err();
        assert!(matches!(err, DirectoryError::DuplicateEmail));
    }

    #[tokio::test]
    async fn full_directory_rejects_registration() {
        let repo = Arc::new(MemoryUserRepository::empty(REGISTRATION_CAPACITY));
        for i in 0..REGISTRATION_CAPACITY {
            repo.insert(new_member(&format!("m{i}"), &format!("m{i}@example.com")))
                .await
                .unwrap();
        }
        let idp = Arc::new(LocalIdentity::new());
        let dir = directory(repo.clone(), idp.clone());

        let err = dir.register(registration("late@example.com")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::CapacityReached(1000)));
        assert!(idp.sign_in("late@example.com", "reunion-2025").await.unwrap().is_none());
        assert_eq!(dir.stats().await.unwrap().available_slots, 0);
    }

    /// Repository whose inserts always fail, to exercise identity cleanup.
    struct FailingInsert(MemoryUserRepository);

    #[async_trait]
    impl UserRepository for FailingInsert {
        async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Profile>> {
            self.0.find_by_email(email).await
        }
        async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Profile>> {
            self.0.find_by_id(id).await
        }
        async fn insert(&self, _profile: NewProfile) -> Result<Profile, DirectoryError> {
            Err(DirectoryError::Backend(anyhow::anyhow!("profile table unavailable")))
        }
        async fn update_status(&self, id: &str, status: UserStatus) -> anyhow::Result<bool> {
            self.0.update_status(id, status).await
        }
        async fn list_all(&self) -> anyhow::Result<Vec<Profile>> {
            self.0.list_all().await
        }
        async fn stats(&self) -> anyhow::Result<RegistrationStats> {
            self.0.stats().await
        }
        async fn ping(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_profile_insert_deletes_the_new_identity() {
        let idp = Arc::new(LocalIdentity::new());
        let dir = UserDirectory::new(
            Arc::new(FailingInsert(MemoryUserRepository::seeded())),
            idp.clone(),
        );

        let err = dir.register(registration("orphan@example.com")).await.unwrap_err();
        assert_eq!(err.to_string(), "profile table unavailable");
        assert!(idp.sign_in("orphan@example.com", "reunion-2025").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oauth_profile_is_created_once() {
        let repo = Arc::new(MemoryUserRepository::seeded());
        let dir = directory(repo.clone(), Arc::new(LocalIdentity::new()));
        let oauth = OAuthSession {
            user_id: "google-123".into(),
            email: "Arjun.Bora@example.com".into(),
            full_name: None,
            session: HostedSession {
                access_token: "a".into(),
                refresh_token: "r".into(),
                expires_in: 3600,
            },
        };

        let first = dir.ensure_oauth_profile(&oauth).await.unwrap();
        assert_eq!(first.name, "Arjun.Bora");
        assert_eq!(first.email, "arjun.bora@example.com");
        let again = dir.ensure_oauth_profile(&oauth).await.unwrap();
        assert_eq!(again.unique_id, first.unique_id);
        assert_eq!(repo.stats().await.unwrap().total_users, 2);
    }
}
