//! Postgres-backed profile store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |---|---|---|
//! | Database (unique violation) | `23505` | `Constraint` |
//! | Database (check violation) | `23514` | `Constraint` |
//! | Database (other) | any other | `Transport` |
//! | RowNotFound | N/A | `NotFound` |
//! | PoolClosed, IO, TLS, ... | N/A | `Transport` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use precinct_auth::{Profile, ProfilePatch, ProfileStore, StoreError, StoredRole};
use precinct_core::UserId;

#[derive(Debug, Clone)]
pub struct PostgresProfileStore {
    pool: PgPool,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Row shape of `profiles`. `role` is read as free text so that values
/// outside the known set still load.
struct ProfileRow {
    id: Uuid,
    email: String,
    role: String,
    display_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for ProfileRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProfileRow {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            role: row.try_get("role")?,
            display_name: row.try_get("display_name")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Profile {
            id: UserId::from_uuid(row.id),
            email: row.email,
            role: StoredRole::from(row.role),
            display_name: row.display_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const COLUMNS: &str = "id, email, role, display_name, created_at, updated_at";

pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23514") => StoreError::Constraint(msg),
                _ => StoreError::Transport(msg),
            }
        }
        sqlx::Error::RowNotFound => StoreError::NotFound(format!("no row in {operation}")),
        sqlx::Error::PoolClosed => {
            StoreError::Transport(format!("connection pool closed in {operation}"))
        }
        other => StoreError::Transport(format!("sqlx error in {operation}: {other}")),
    }
}

#[async_trait]
impl ProfileStore for PostgresProfileStore {
    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn fetch_by_identity_id(&self, id: UserId) -> Result<Option<Profile>, StoreError> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_profile", e))?;

        row.map(|r| ProfileRow::from_row(&r).map(Profile::from))
            .transpose()
            .map_err(|e| StoreError::Transport(format!("failed to decode profile row: {e}")))
    }

    #[instrument(skip(self, display_name_hint), fields(user_id = %id), err)]
    async fn create_default(
        &self,
        id: UserId,
        email: &str,
        display_name_hint: Option<&str>,
    ) -> Result<Profile, StoreError> {
        let profile = Profile::new_default(id, email, display_name_hint, Utc::now());
        let row = sqlx::query(&format!(
            "INSERT INTO profiles ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {COLUMNS}"
        ))
        .bind(profile.id.as_uuid())
        .bind(&profile.email)
        .bind(profile.role.as_str())
        .bind(&profile.display_name)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_profile", e))?;

        debug!("default profile inserted");
        ProfileRow::from_row(&row)
            .map(Profile::from)
            .map_err(|e| StoreError::Transport(format!("failed to decode profile row: {e}")))
    }

    #[instrument(skip(self, patch), fields(user_id = %id), err)]
    async fn update(&self, id: UserId, patch: ProfilePatch) -> Result<Profile, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE profiles SET \
                email = COALESCE($2, email), \
                role = COALESCE($3, role), \
                display_name = COALESCE($4, display_name), \
                updated_at = $5 \
             WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(patch.email.as_deref())
        .bind(patch.role.map(|r| r.as_str()))
        .bind(patch.display_name.as_deref())
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_profile", e))?;

        let Some(row) = row else {
            return Err(StoreError::NotFound(format!("profile {id}")));
        };
        ProfileRow::from_row(&row)
            .map(Profile::from)
            .map_err(|e| StoreError::Transport(format!("failed to decode profile row: {e}")))
    }
}
