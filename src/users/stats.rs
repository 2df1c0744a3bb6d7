use serde::Serialize;

use super::model::{Profile, Role, UserStatus};

/// Maximum number of registered (non-admin) users.
pub const REGISTRATION_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStats {
    pub total_users: usize,
    pub active_users: usize,
    pub pending_users: usize,
    pub suspended_users: usize,
    pub available_slots: usize,
    pub capacity: usize,
    pub is_capacity_full: bool,
}

impl RegistrationStats {
    pub fn from_counts(total: usize, active: usize, pending: usize, suspended: usize) -> Self {
        Self::with_capacity(total, active, pending, suspended, REGISTRATION_CAPACITY)
    }

    pub fn with_capacity(
        total: usize,
        active: usize,
        pending: usize,
        suspended: usize,
        capacity: usize,
    ) -> Self {
        Self {
            total_users: total,
            active_users: active,
            pending_users: pending,
            suspended_users: suspended,
            available_slots: capacity.saturating_sub(total),
            capacity,
            is_capacity_full: total >= capacity,
        }
    }

    /// Aggregate over a full listing. Admin accounts do not consume capacity.
    pub fn compute(profiles: &[Profile], capacity: usize) -> Self {
        let members = profiles.iter().filter(|p| p.role == Role::User);
        let (mut total, mut active, mut pending, mut suspended) = (0, 0, 0, 0);
        for p in members {
            total += 1;
            match p.status {
                UserStatus::Active => active += 1,
                UserStatus::Pending => pending += 1,
                UserStatus::Suspended => suspended += 1,
            }
        }
        Self::with_capacity(total, active, pending, suspended, capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::model::NewProfile;
    use time::OffsetDateTime;

    fn profile(id: &str, role: Role, status: UserStatus) -> Profile {
        let mut p = NewProfile {
            id: id.into(),
            email: format!("{id}@example.com"),
            name: id.into(),
            role,
            batch: None,
            department: None,
            phone: None,
            address: None,
            year_of_passing: None,
        }
        .into_profile(None, OffsetDateTime::now_utc());
        p.status = status;
        p
    }

    #[test]
    fn counts_members_by_status_and_ignores_admins() {
        let profiles = vec![
            profile("admin", Role::Admin, UserStatus::Active),
            profile("a", Role::User, UserStatus::Active),
            profile("b", Role::User, UserStatus::Active),
            profile("c", Role::User, UserStatus::Pending),
            profile("d", Role::User, UserStatus::Suspended),
        ];
        let stats = RegistrationStats::compute(&profiles, REGISTRATION_CAPACITY);
        assert_eq!(stats.total_users, 4);
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.pending_users, 1);
        assert_eq!(stats.suspended_users, 1);
        assert_eq!(stats.available_slots, REGISTRATION_CAPACITY - 4);
        assert!(!stats.is_capacity_full);
    }

    #[test]
    fn available_slots_is_capacity_minus_total() {
        for total in [0usize, 1, 999, 1000] {
            let stats = RegistrationStats::from_counts(total, total, 0, 0);
            assert_eq!(stats.available_slots, 1000 - total);
            assert_eq!(stats.is_capacity_full, total == 1000);
        }
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(RegistrationStats::from_counts(1, 1, 0, 0)).unwrap();
        assert_eq!(json["availableSlots"], 999);
        assert_eq!(json["isCapacityFull"], false);
        assert_eq!(json["capacity"], 1000);
    }
}
