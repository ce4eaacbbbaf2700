//! Role-gated access to records.
//!
//! Every operation evaluates the authorization gate against the session as it
//! is at call time; nothing about the caller is cached between calls.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, instrument};

use precinct_auth::{Decision, Role, Session, StoreError, decide};
use precinct_core::{CivilianId, DomainError, OfficerId, StationId, UserId};

use crate::complaint::sort_newest_first;
use crate::{
    Civilian, CivilianPatch, Complaint, CriminalRecord, NewComplaint, PoliceStation,
    RecordRepository,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("you must be logged in to access this page")]
    NotAuthenticated,

    #[error("only {required} users can access this page")]
    Forbidden { required: Role },

    #[error("session is still loading")]
    Loading,

    #[error("no civilian record is linked to this account")]
    NoCivilianRecord,

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AccessError {
    /// Map a non-`Allow` gate decision to an error.
    pub fn from_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::Allow => None,
            Decision::ShowLoading => Some(AccessError::Loading),
            Decision::RedirectToLogin => Some(AccessError::NotAuthenticated),
            Decision::RedirectToHome { required } => Some(AccessError::Forbidden { required }),
        }
    }
}

#[derive(Clone)]
pub struct RecordService {
    repo: Arc<dyn RecordRepository>,
    session: watch::Receiver<Session>,
}

impl RecordService {
    pub fn new(repo: Arc<dyn RecordRepository>, session: watch::Receiver<Session>) -> Self {
        Self { repo, session }
    }

    /// Gate on `required` and return the caller's user id.
    fn authorize(&self, required: Role) -> Result<UserId, AccessError> {
        let session = self.session.borrow();
        if let Some(err) = AccessError::from_decision(decide(&session, Some(required))) {
            debug!(%required, error = %err, "record access refused");
            return Err(err);
        }
        session
            .identity
            .as_ref()
            .map(|i| i.id)
            .ok_or(AccessError::NotAuthenticated)
    }

    async fn my_civilian_id(&self, user_id: UserId) -> Result<CivilianId, AccessError> {
        self.repo
            .civilian_by_user(user_id)
            .await?
            .map(|c| c.id)
            .ok_or(AccessError::NoCivilianRecord)
    }

    pub async fn list_stations(&self) -> Result<Vec<PoliceStation>, AccessError> {
        Ok(self.repo.list_stations().await?)
    }

    pub async fn get_station(&self, id: StationId) -> Result<Option<PoliceStation>, AccessError> {
        Ok(self.repo.get_station(id).await?)
    }

    pub async fn search_stations(&self, query: &str) -> Result<Vec<PoliceStation>, AccessError> {
        if query.trim().is_empty() {
            return self.list_stations().await;
        }
        Ok(self.repo.search_stations(query.trim()).await?)
    }

    pub async fn list_civilians(&self) -> Result<Vec<Civilian>, AccessError> {
        self.authorize(Role::Police)?;
        let mut civilians = self.repo.list_civilians().await?;
        civilians.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(civilians)
    }

    pub async fn list_criminals(&self) -> Result<Vec<CriminalRecord>, AccessError> {
        self.authorize(Role::Police)?;
        Ok(self.repo.list_criminals().await?)
    }

    #[instrument(skip(self), err)]
    pub async fn set_criminal_status(
        &self,
        civilian_id: CivilianId,
        is_criminal: bool,
    ) -> Result<Civilian, AccessError> {
        let officer = self.authorize(Role::Police)?;
        let civilian = self.repo.set_criminal_status(civilian_id, is_criminal).await?;
        info!(user_id = %officer, civilian_id = %civilian.id, is_criminal, "criminal status changed");
        Ok(civilian)
    }

    pub async fn my_civilian_record(&self) -> Result<Option<Civilian>, AccessError> {
        let user_id = self.authorize(Role::Civilian)?;
        Ok(self.repo.civilian_by_user(user_id).await?)
    }

    #[instrument(skip(self, patch), err)]
    pub async fn update_my_civilian_record(
        &self,
        patch: CivilianPatch,
    ) -> Result<Civilian, AccessError> {
        let user_id = self.authorize(Role::Civilian)?;
        patch.validate()?;
        match self.repo.update_civilian_by_user(user_id, &patch).await {
            Ok(civilian) => Ok(civilian),
            Err(StoreError::NotFound(_)) => Err(AccessError::NoCivilianRecord),
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self, complaint), err)]
    pub async fn file_complaint(&self, complaint: NewComplaint) -> Result<Complaint, AccessError> {
        let user_id = self.authorize(Role::Civilian)?;
        complaint.validate()?;
        let complainant = self.my_civilian_id(user_id).await?;
        let complaint = complaint.file(complainant, Utc::now())?;
        let stored = self.repo.insert_complaint(complaint).await?;
        info!(complaint_id = %stored.id, complainant_id = %complainant, "complaint filed");
        Ok(stored)
    }

    pub async fn complaints_for_officer(
        &self,
        officer_id: OfficerId,
    ) -> Result<Vec<Complaint>, AccessError> {
        self.authorize(Role::Police)?;
        let mut complaints = self.repo.complaints_for_officer(officer_id).await?;
        sort_newest_first(&mut complaints);
        Ok(complaints)
    }

    pub async fn my_complaints(&self) -> Result<Vec<Complaint>, AccessError> {
        let user_id = self.authorize(Role::Civilian)?;
        let complainant = self.my_civilian_id(user_id).await?;
        let mut complaints = self.repo.complaints_by_complainant(complainant).await?;
        sort_newest_first(&mut complaints);
        Ok(complaints)
    }
}

impl core::fmt::Debug for RecordService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RecordService").finish_non_exhaustive()
    }
}
