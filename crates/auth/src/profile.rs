//! Profile store boundary.
//!
//! A profile is the domain-owned record carrying the role, keyed by the
//! identity id. Rows follow the `profiles` table shape
//! (`id, email, role, display_name, created_at, updated_at`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use precinct_core::UserId;

use crate::{Role, StoredRole};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub role: StoredRole,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// A freshly created profile: always `civilian`.
    pub fn new_default(
        id: UserId,
        email: &str,
        display_name_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email: email.to_string(),
            role: StoredRole::Known(Role::Civilian),
            display_name: Some(default_display_name(email, display_name_hint)),
            created_at: now,
            updated_at: now,
        }
    }

    /// Effective role; `None` for values outside the known set.
    pub fn role(&self) -> Option<Role> {
        self.role.role()
    }

    pub fn apply(&mut self, patch: &ProfilePatch, now: DateTime<Utc>) {
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        if let Some(role) = patch.role {
            self.role = StoredRole::Known(role);
        }
        if let Some(display_name) = &patch.display_name {
            self.display_name = Some(display_name.clone());
        }
        self.updated_at = now;
    }
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.role.is_none() && self.display_name.is_none()
    }
}

/// Display name used at profile creation: the trimmed hint, else the email
/// local-part.
pub fn default_display_name(email: &str, hint: Option<&str>) -> String {
    match hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(hint) => hint.to_string(),
        None => email.split('@').next().unwrap_or(email).to_string(),
    }
}

/// Storage failure. "Not found" on fetch is not an error (`Ok(None)`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store transport failure: {0}")]
    Transport(String),

    #[error("no row matches {0}")]
    NotFound(String),

    /// Unique/check constraint rejected the write (e.g. concurrent create).
    #[error("constraint violation: {0}")]
    Constraint(String),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_by_identity_id(&self, id: UserId) -> Result<Option<Profile>, StoreError>;

    /// Insert a `civilian` profile. Fails with `Constraint` if a row for `id`
    /// already exists; callers treat that as benign and re-fetch.
    async fn create_default(
        &self,
        id: UserId,
        email: &str,
        display_name_hint: Option<&str>,
    ) -> Result<Profile, StoreError>;

    /// Fails with `NotFound` if no row matches.
    async fn update(&self, id: UserId, patch: ProfilePatch) -> Result<Profile, StoreError>;
}
