use async_trait::async_trait;
use parking_lot::RwLock;
use time::{macros::datetime, OffsetDateTime};

use super::{
    model::{format_unique_id, NewProfile, Profile, Role, UserStatus},
    repo::{DirectoryError, UserRepository},
    stats::{RegistrationStats, REGISTRATION_CAPACITY},
};

pub const DEMO_ADMIN_ID: &str = "admin-1";
pub const DEMO_ADMIN_EMAIL: &str = "admin@balyabhavan.edu";
pub const DEMO_USER_ID: &str = "user-1";
pub const DEMO_USER_EMAIL: &str = "rajesh.kumar@example.com";
pub const DEMO_PASSWORD: &str = "password";

/// Development fallback used when the hosted backend is disabled.
pub struct MemoryUserRepository {
    profiles: RwLock<Vec<Profile>>,
    capacity: usize,
}

impl MemoryUserRepository {
    pub fn empty(capacity: usize) -> Self {
        Self { profiles: RwLock::new(Vec::new()), capacity }
    }

    /// Seeded with the demo admin and one demo member.
    pub fn seeded() -> Self {
        let repo = Self::empty(REGISTRATION_CAPACITY);
        repo.profiles.write().extend(demo_profiles());
        repo
    }
}

fn demo_profiles() -> Vec<Profile> {
    let admin_created = datetime!(2025-01-01 00:00 UTC);
    let user_created = datetime!(2025-01-15 00:00 UTC);

    let admin = NewProfile {
        id: DEMO_ADMIN_ID.into(),
        email: DEMO_ADMIN_EMAIL.into(),
        name: "Admin User".into(),
        role: Role::Admin,
        batch: None,
        department: None,
        phone: None,
        address: None,
        year_of_passing: None,
    }
    .into_profile(None, admin_created);

    let member = NewProfile {
        id: DEMO_USER_ID.into(),
        email: DEMO_USER_EMAIL.into(),
        name: "Rajesh Kumar".into(),
        role: Role::User,
        batch: Some("1995-2000".into()),
        department: Some("Computer Science".into()),
        phone: Some("+91 98765 43210".into()),
        address: Some("Jorhat, Assam".into()),
        year_of_passing: Some("2000".into()),
    }
    .into_profile(Some(format_unique_id(2025, 1)), user_created);

    vec![admin, member]
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Profile>> {
        Ok(self
            .profiles
            .read()
            .iter()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Profile>> {
        Ok(self.profiles.read().iter().find(|p| p.id == id).cloned())
    }

    async fn insert(&self, new: NewProfile) -> Result<Profile, DirectoryError> {
        let mut profiles = self.profiles.write();

        let members = profiles.iter().filter(|p| p.role == Role::User).count();
        if new.role == Role::User && members >= self.capacity {
            return Err(DirectoryError::CapacityReached(self.capacity));
        }
        if profiles.iter().any(|p| p.email.eq_ignore_ascii_case(&new.email)) {
            return Err(DirectoryError::DuplicateEmail);
        }

        let now = OffsetDateTime::now_utc();
        let unique_id = format_unique_id(now.year(), members + 1);
        let profile = new.into_profile(Some(unique_id), now);
        profiles.push(profile.clone());
        Ok(profile)
    }

    async fn update_status(&self, id: &str, status: UserStatus) -> anyhow::Result<bool> {
        let mut profiles = self.profiles.write();
        match profiles.iter_mut().find(|p| p.id == id && p.role == Role::User) {
            Some(p) => {
                p.status = status;
                p.updated_at = OffsetDateTime::now_utc();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_all(&self) -> anyhow::Result<Vec<Profile>> {
        Ok(self.profiles.read().clone())
    }

    async fn stats(&self) -> anyhow::Result<RegistrationStats> {
        Ok(RegistrationStats::compute(&self.profiles.read(), self.capacity))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn new_member(id: &str, email: &str) -> NewProfile {
    NewProfile {
        id: id.into(),
        email: email.into(),
        name: format!("Member {id}"),
        role: Role::User,
        batch: Some("2010-2015".into()),
        department: Some("Physics".into()),
        phone: None,
        address: None,
        year_of_passing: Some("2015".into()),
    }
}
