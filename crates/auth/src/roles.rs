use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role identifier used for view/action gating.
///
/// Closed set: a session is either `police` or `civilian`. Values outside this
/// set coming back from the profile store are carried as
/// [`StoredRole::Unrecognized`] and grant nothing.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Police,
    Civilian,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 2] = [Role::Police, Role::Civilian];

    /// Strict parse: exactly `"police"` or `"civilian"`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "police" => Some(Role::Police),
            "civilian" => Some(Role::Civilian),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Police => "police",
            Role::Civilian => "civilian",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role column as read from the profile store.
///
/// The store is expected to enforce the two-value constraint, but a row may
/// still carry anything; unrecognized values are kept verbatim for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StoredRole {
    Known(Role),
    Unrecognized(String),
}

impl StoredRole {
    /// The effective role, if the stored value is one we recognize.
    pub fn role(&self) -> Option<Role> {
        match self {
            StoredRole::Known(role) => Some(*role),
            StoredRole::Unrecognized(_) => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StoredRole::Known(role) => role.as_str(),
            StoredRole::Unrecognized(raw) => raw,
        }
    }
}

impl From<Role> for StoredRole {
    fn from(value: Role) -> Self {
        StoredRole::Known(value)
    }
}

impl From<String> for StoredRole {
    fn from(value: String) -> Self {
        match Role::parse(&value) {
            Some(role) => StoredRole::Known(role),
            None => StoredRole::Unrecognized(value),
        }
    }
}

impl From<StoredRole> for String {
    fn from(value: StoredRole) -> Self {
        match value {
            StoredRole::Known(role) => role.as_str().to_string(),
            StoredRole::Unrecognized(raw) => raw,
        }
    }
}

impl core::fmt::Display for StoredRole {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_exact() {
        assert_eq!(Role::parse("police"), Some(Role::Police));
        assert_eq!(Role::parse("civilian"), Some(Role::Civilian));
        assert_eq!(Role::parse("Police"), None);
        assert_eq!(Role::parse(" civilian"), None);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn stored_role_keeps_unrecognized_values() {
        let stored: StoredRole = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(stored, StoredRole::Unrecognized("admin".to_string()));
        assert_eq!(stored.role(), None);
        assert_eq!(serde_json::to_string(&stored).unwrap(), "\"admin\"");

        let known: StoredRole = serde_json::from_str("\"police\"").unwrap();
        assert_eq!(known.role(), Some(Role::Police));
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Civilian).unwrap(), "\"civilian\"");
    }
}
