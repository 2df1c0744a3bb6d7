use anyhow::Context;
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};

use super::{
    model::{NewProfile, Profile, Role, UserStatus},
    repo::{DirectoryError, UserRepository},
    stats::{RegistrationStats, REGISTRATION_CAPACITY},
};

const PROFILE_COLUMNS: &str = "id, unique_id, email, name, role, batch, department, phone, \
     address, year_of_passing, status, registration_date, created_at, updated_at";

// Serialises registrations so the capacity check and insert see a stable count.
const REGISTRATION_LOCK_KEY: i64 = 0x414c_4d00;

/// Profile row as stored in the hosted database.
#[derive(Debug, FromRow)]
pub struct ProfileRow {
    pub id: String,
    pub unique_id: Option<String>,
    pub email: String,
    pub name: String,
    pub role: String,
    pub batch: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub year_of_passing: Option<String>,
    pub status: String,
    pub registration_date: Date,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<ProfileRow> for Profile {
    type Error = anyhow::Error;

    fn try_from(r: ProfileRow) -> anyhow::Result<Self> {
        Ok(Self {
            role: r.role.parse().with_context(|| format!("profile {}", r.id))?,
            status: r.status.parse().with_context(|| format!("profile {}", r.id))?,
            id: r.id,
            unique_id: r.unique_id,
            email: r.email,
            name: r.name,
            batch: r.batch,
            department: r.department,
            phone: r.phone,
            address: r.address,
            year_of_passing: r.year_of_passing,
            registration_date: r.registration_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> anyhow::Result<Option<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM users WHERE {column} = $1");
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .with_context(|| format!("select user by {column}"))?;
        row.map(Profile::try_from).transpose()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<Profile>> {
        self.fetch_one_by("lower(email)", &email.to_lowercase()).await
    }

    async fn find_by_id(&self, id: &str) -> anyhow::Result<Option<Profile>> {
        self.fetch_one_by("id", id).await
    }

    async fn insert(&self, new: NewProfile) -> Result<Profile, DirectoryError> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(REGISTRATION_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .context("registration lock")?;

        let (members,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'user'")
            .fetch_one(&mut *tx)
            .await
            .context("count members")?;
        if new.role == Role::User && members as usize >= REGISTRATION_CAPACITY {
            return Err(DirectoryError::CapacityReached(REGISTRATION_CAPACITY));
        }

        let (unique_id,): (String,) = sqlx::query_as("SELECT generate_unique_user_id()")
            .fetch_one(&mut *tx)
            .await
            .context("generate unique id")?;

        let sql = format!(
            r#"
            INSERT INTO users (id, unique_id, email, name, role, batch, department, phone,
                               address, year_of_passing, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'active')
            RETURNING {PROFILE_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(&new.id)
            .bind(&unique_id)
            .bind(&new.email)
            .bind(&new.name)
            .bind(new.role.as_str())
            .bind(&new.batch)
            .bind(&new.department)
            .bind(&new.phone)
            .bind(&new.address)
            .bind(&new.year_of_passing)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    DirectoryError::DuplicateEmail
                }
                other => DirectoryError::Backend(anyhow::Error::new(other).context("insert user")),
            })?;

        tx.commit().await.context("commit tx")?;
        Ok(Profile::try_from(row)?)
    }

    async fn update_status(&self, id: &str, status: UserStatus) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE users
               SET status = $2, updated_at = now()
             WHERE id = $1 AND role = 'user'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.db)
        .await
        .context("update user status")?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_all(&self) -> anyhow::Result<Vec<Profile>> {
        let sql = format!("SELECT {PROFILE_COLUMNS} FROM users ORDER BY created_at ASC");
        let rows = sqlx::query_as::<_, ProfileRow>(&sql)
            .fetch_all(&self.db)
            .await
            .context("list users")?;
        rows.into_iter().map(Profile::try_from).collect()
    }

    async fn stats(&self) -> anyhow::Result<RegistrationStats> {
        let (total, active, pending, suspended): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'active'),
                   COUNT(*) FILTER (WHERE status = 'pending'),
                   COUNT(*) FILTER (WHERE status = 'suspended')
              FROM users
             WHERE role = 'user'
            "#,
        )
        .fetch_one(&self.db)
        .await
        .context("registration stats")?;

        Ok(RegistrationStats::from_counts(
            total as usize,
            active as usize,
            pending as usize,
            suspended as usize,
        ))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.db)
            .await
            .context("ping database")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn row(role: &str, status: &str) -> ProfileRow {
        ProfileRow {
            id: "9b2c".into(),
            unique_id: Some("ALM-2025-004".into()),
            email: "meera@example.com".into(),
            name: "Meera".into(),
            role: role.into(),
            batch: None,
            department: Some("Chemistry".into()),
            phone: None,
            address: None,
            year_of_passing: None,
            status: status.into(),
            registration_date: date!(2025-02-01),
            created_at: datetime!(2025-02-01 08:00 UTC),
            updated_at: datetime!(2025-02-01 08:00 UTC),
        }
    }

    #[test]
    fn row_converts_to_profile() {
        let p = Profile::try_from(row("admin", "pending")).unwrap();
        assert_eq!(p.role, Role::Admin);
        assert_eq!(p.status, UserStatus::Pending);
        assert_eq!(p.department.as_deref(), Some("Chemistry"));
    }

    #[test]
    fn row_with_unknown_status_is_an_error() {
        let err = Profile::try_from(row("user", "deleted")).unwrap_err();
        assert!(format!("{err:#}").contains("unknown status value: deleted"));
    }
}
