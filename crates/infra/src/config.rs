//! Configuration loading and representation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const AUTH_URL_VAR: &str = "PRECINCT_AUTH_URL";
pub const AUTH_API_KEY_VAR: &str = "PRECINCT_AUTH_API_KEY";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const DB_MAX_CONNECTIONS_VAR: &str = "PRECINCT_DB_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Settings for the remote identity provider and the records database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base URL of the identity service, without a trailing slash.
    pub auth_url: String,
    pub auth_api_key: String,
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup. Blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let auth_url = require(AUTH_URL_VAR)?;
        if !(auth_url.starts_with("http://") || auth_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: AUTH_URL_VAR,
                value: auth_url,
                expected: "an http(s) URL",
            });
        }

        let db_max_connections = match get(DB_MAX_CONNECTIONS_VAR) {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::Invalid {
                    name: DB_MAX_CONNECTIONS_VAR,
                    value: raw,
                    expected: "a positive integer",
                })?,
        };

        Ok(Self {
            auth_url: auth_url.trim_end_matches('/').to_string(),
            auth_api_key: require(AUTH_API_KEY_VAR)?,
            database_url: require(DATABASE_URL_VAR)?,
            db_max_connections,
        })
    }
}
