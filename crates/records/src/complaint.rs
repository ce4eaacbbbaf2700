use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use precinct_core::{CivilianId, ComplaintId, DomainResult, OfficerId, require_text};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    #[default]
    Open,
    UnderReview,
    Resolved,
    Dismissed,
}

impl ComplaintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Open => "open",
            ComplaintStatus::UnderReview => "under_review",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Dismissed => "dismissed",
        }
    }

    /// Lenient parse for stored values; anything unknown reads as `Open`.
    pub fn parse_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("under_review") => ComplaintStatus::UnderReview,
            Some("resolved") => ComplaintStatus::Resolved,
            Some("dismissed") => ComplaintStatus::Dismissed,
            _ => ComplaintStatus::Open,
        }
    }
}

/// A complaint filed by a civilian, optionally against an officer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: ComplaintId,
    pub complainant_id: Option<CivilianId>,
    pub officer_id: Option<OfficerId>,
    pub subject: String,
    pub description: String,
    pub status: ComplaintStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for filing a complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComplaint {
    pub officer_id: Option<OfficerId>,
    pub subject: String,
    pub description: String,
}

impl NewComplaint {
    pub fn validate(&self) -> DomainResult<()> {
        require_text("subject", &self.subject)?;
        require_text("description", &self.description)?;
        Ok(())
    }

    /// Validate and turn into an `Open` complaint by `complainant`.
    pub fn file(self, complainant: CivilianId, now: DateTime<Utc>) -> DomainResult<Complaint> {
        self.validate()?;
        Ok(Complaint {
            id: ComplaintId::new(),
            complainant_id: Some(complainant),
            officer_id: self.officer_id,
            subject: self.subject.trim().to_string(),
            description: self.description.trim().to_string(),
            status: ComplaintStatus::Open,
            created_at: now,
        })
    }
}

/// Newest first.
pub(crate) fn sort_newest_first(complaints: &mut [Complaint]) {
    complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
