use async_trait::async_trait;

use precinct_auth::StoreError;
use precinct_core::{CivilianId, OfficerId, StationId, UserId};

use crate::{Civilian, CivilianPatch, Complaint, CriminalRecord, PoliceStation};

/// Storage for police-administration records.
///
/// Implementations perform no authorization; callers go through
/// [`RecordService`](crate::RecordService).
#[async_trait]
pub trait RecordRepository: Send + Sync {
    /// All stations with their officers.
    async fn list_stations(&self) -> Result<Vec<PoliceStation>, StoreError>;

    async fn get_station(&self, id: StationId) -> Result<Option<PoliceStation>, StoreError>;

    /// Case-insensitive substring search over name, city and state.
    async fn search_stations(&self, query: &str) -> Result<Vec<PoliceStation>, StoreError>;

    /// Ordered by name.
    async fn list_civilians(&self) -> Result<Vec<Civilian>, StoreError>;

    /// Civilians flagged as criminal, with their crimes.
    async fn list_criminals(&self) -> Result<Vec<CriminalRecord>, StoreError>;

    /// Fails with `NotFound` if no civilian matches.
    async fn set_criminal_status(
        &self,
        id: CivilianId,
        is_criminal: bool,
    ) -> Result<Civilian, StoreError>;

    async fn civilian_by_user(&self, user_id: UserId) -> Result<Option<Civilian>, StoreError>;

    /// Fails with `NotFound` if no civilian is linked to `user_id`.
    async fn update_civilian_by_user(
        &self,
        user_id: UserId,
        patch: &CivilianPatch,
    ) -> Result<Civilian, StoreError>;

    async fn insert_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError>;

    /// Newest first.
    async fn complaints_for_officer(&self, officer_id: OfficerId) -> Result<Vec<Complaint>, StoreError>;

    /// Newest first.
    async fn complaints_by_complainant(
        &self,
        complainant_id: CivilianId,
    ) -> Result<Vec<Complaint>, StoreError>;
}
