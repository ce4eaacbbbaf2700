//! Police-administration records and role-gated access to them.
//!
//! Record types and their rules are plain data (no IO). Storage sits behind
//! [`RecordRepository`]; [`RecordService`] applies the authorization gate
//! against the live session before touching it.

pub mod civilian;
pub mod complaint;
pub mod in_memory;
pub mod repository;
pub mod service;
pub mod station;

pub use civilian::{Civilian, CivilianPatch, Crime, CriminalRecord};
pub use complaint::{Complaint, ComplaintStatus, NewComplaint};
pub use repository::RecordRepository;
pub use service::{AccessError, RecordService};
pub use station::{Officer, PoliceStation};
