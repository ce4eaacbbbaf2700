//! Infrastructure layer: configuration, Postgres adapters and the HTTP
//! identity provider.

pub mod config;
pub mod db;
pub mod identity_http;
pub mod profile_store;
pub mod record_store;

pub use config::{AppConfig, ConfigError};
pub use db::{connect_pool, ensure_schema};
pub use identity_http::HttpIdentityProvider;
pub use profile_store::PostgresProfileStore;
pub use record_store::PostgresRecordRepository;
