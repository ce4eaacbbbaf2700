//! `precinct-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult, require_text};
pub use id::{CivilianId, ComplaintId, CrimeId, OfficerId, StationId, UserId};
