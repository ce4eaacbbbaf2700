//! Postgres-backed record repository over `police_stations`, `officers`,
//! `civilians`, `crimes` and `complaints`.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use precinct_auth::StoreError;
use precinct_core::{CivilianId, ComplaintId, CrimeId, OfficerId, StationId, UserId};
use precinct_records::{
    Civilian, CivilianPatch, Complaint, ComplaintStatus, Crime, CriminalRecord, Officer,
    PoliceStation, RecordRepository,
};

use crate::profile_store::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresRecordRepository {
    pool: PgPool,
}

impl PostgresRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_officers(
        &self,
        mut stations: Vec<PoliceStation>,
    ) -> Result<Vec<PoliceStation>, StoreError> {
        if stations.is_empty() {
            return Ok(stations);
        }
        let ids: Vec<Uuid> = stations.iter().map(|s| *s.id.as_uuid()).collect();
        let rows = sqlx::query(
            "SELECT id, station_id, name, rank, email, phone, age, gender, description \
             FROM officers WHERE station_id = ANY($1) ORDER BY name",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_officers", e))?;

        let mut by_station: HashMap<Uuid, Vec<Officer>> = HashMap::new();
        for row in rows {
            let station_id: Uuid = row.try_get("station_id").map_err(decode)?;
            by_station
                .entry(station_id)
                .or_default()
                .push(officer_from_row(&row).map_err(decode)?);
        }
        for station in &mut stations {
            station.officers = by_station.remove(station.id.as_uuid()).unwrap_or_default();
        }
        Ok(stations)
    }

    async fn civilian_where(
        &self,
        operation: &str,
        clause: &str,
        id: Uuid,
    ) -> Result<Option<Civilian>, StoreError> {
        let row = sqlx::query(&format!("SELECT {CIVILIAN_COLUMNS} FROM civilians WHERE {clause} = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.map(|r| civilian_from_row(&r)).transpose().map_err(decode)
    }

    async fn complaints_where(
        &self,
        operation: &str,
        clause: &str,
        id: Uuid,
    ) -> Result<Vec<Complaint>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE {clause} = $1 ORDER BY created_at DESC"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(operation, e))?;
        rows.iter().map(complaint_from_row).collect::<Result<_, _>>().map_err(decode)
    }
}

const STATION_COLUMNS: &str =
    "id, name, address, city, state, zip_code, phone, email, latitude, longitude, created_at";
const CIVILIAN_COLUMNS: &str =
    "id, user_id, name, phone, address, city, state, pincode, job, salary, is_criminal, created_at";
const COMPLAINT_COLUMNS: &str =
    "id, complainant_id, officer_id, subject, description, status, created_at";

fn decode(err: sqlx::Error) -> StoreError {
    StoreError::Transport(format!("failed to decode row: {err}"))
}

/// `%query%` with LIKE metacharacters escaped.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn station_from_row(row: &PgRow) -> Result<PoliceStation, sqlx::Error> {
    Ok(PoliceStation {
        id: StationId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        zip_code: row.try_get("zip_code")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        created_at: row.try_get("created_at")?,
        officers: Vec::new(),
    })
}

fn officer_from_row(row: &PgRow) -> Result<Officer, sqlx::Error> {
    let age: i16 = row.try_get("age")?;
    Ok(Officer {
        id: OfficerId::from_uuid(row.try_get("id")?),
        name: row.try_get("name")?,
        rank: row.try_get("rank")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        age: u8::try_from(age).unwrap_or_default(),
        gender: row.try_get("gender")?,
        description: row.try_get("description")?,
    })
}

fn civilian_from_row(row: &PgRow) -> Result<Civilian, sqlx::Error> {
    let user_id: Option<Uuid> = row.try_get("user_id")?;
    Ok(Civilian {
        id: CivilianId::from_uuid(row.try_get("id")?),
        user_id: user_id.map(UserId::from_uuid),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        pincode: row.try_get("pincode")?,
        job: row.try_get("job")?,
        salary: row.try_get("salary")?,
        is_criminal: row.try_get("is_criminal")?,
        created_at: row.try_get("created_at")?,
    })
}

fn complaint_from_row(row: &PgRow) -> Result<Complaint, sqlx::Error> {
    let complainant_id: Option<Uuid> = row.try_get("complainant_id")?;
    let officer_id: Option<Uuid> = row.try_get("officer_id")?;
    let status: Option<String> = row.try_get("status")?;
    Ok(Complaint {
        id: ComplaintId::from_uuid(row.try_get("id")?),
        complainant_id: complainant_id.map(CivilianId::from_uuid),
        officer_id: officer_id.map(OfficerId::from_uuid),
        subject: row.try_get("subject")?,
        description: row.try_get("description")?,
        status: ComplaintStatus::parse_stored(status.as_deref()),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl RecordRepository for PostgresRecordRepository {
    #[instrument(skip(self), err)]
    async fn list_stations(&self) -> Result<Vec<PoliceStation>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {STATION_COLUMNS} FROM police_stations ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_stations", e))?;
        let stations: Vec<PoliceStation> =
            rows.iter().map(station_from_row).collect::<Result<_, _>>().map_err(decode)?;
        self.attach_officers(stations).await
    }

    #[instrument(skip(self), fields(station_id = %id), err)]
    async fn get_station(&self, id: StationId) -> Result<Option<PoliceStation>, StoreError> {
        let row = sqlx::query(&format!("SELECT {STATION_COLUMNS} FROM police_stations WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_station", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let station = station_from_row(&row).map_err(decode)?;
        Ok(self.attach_officers(vec![station]).await?.pop())
    }

    #[instrument(skip(self), err)]
    async fn search_stations(&self, query: &str) -> Result<Vec<PoliceStation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {STATION_COLUMNS} FROM police_stations \
             WHERE name ILIKE $1 OR city ILIKE $1 OR state ILIKE $1 ORDER BY name"
        ))
        .bind(like_pattern(query))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("search_stations", e))?;
        let stations: Vec<PoliceStation> =
            rows.iter().map(station_from_row).collect::<Result<_, _>>().map_err(decode)?;
        self.attach_officers(stations).await
    }

    #[instrument(skip(self), err)]
    async fn list_civilians(&self) -> Result<Vec<Civilian>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {CIVILIAN_COLUMNS} FROM civilians ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_civilians", e))?;
        rows.iter().map(civilian_from_row).collect::<Result<_, _>>().map_err(decode)
    }

    #[instrument(skip(self), err)]
    async fn list_criminals(&self) -> Result<Vec<CriminalRecord>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CIVILIAN_COLUMNS} FROM civilians WHERE is_criminal ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_criminals", e))?;
        let civilians: Vec<Civilian> =
            rows.iter().map(civilian_from_row).collect::<Result<_, _>>().map_err(decode)?;
        if civilians.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = civilians.iter().map(|c| *c.id.as_uuid()).collect();
        let crime_rows = sqlx::query(
            "SELECT id, civilian_id, description, date FROM crimes \
             WHERE civilian_id = ANY($1) ORDER BY date",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_crimes", e))?;

        let mut crimes: HashMap<Uuid, Vec<Crime>> = HashMap::new();
        for row in crime_rows {
            let civilian_id: Uuid = row.try_get("civilian_id").map_err(decode)?;
            crimes.entry(civilian_id).or_default().push(Crime {
                id: CrimeId::from_uuid(row.try_get("id").map_err(decode)?),
                description: row.try_get("description").map_err(decode)?,
                date: row.try_get("date").map_err(decode)?,
            });
        }

        Ok(civilians
            .into_iter()
            .map(|civilian| CriminalRecord {
                crimes: crimes.remove(civilian.id.as_uuid()).unwrap_or_default(),
                civilian,
            })
            .collect())
    }

    #[instrument(skip(self), fields(civilian_id = %id), err)]
    async fn set_criminal_status(
        &self,
        id: CivilianId,
        is_criminal: bool,
    ) -> Result<Civilian, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE civilians SET is_criminal = $2 WHERE id = $1 RETURNING {CIVILIAN_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(is_criminal)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_criminal_status", e))?;
        let Some(row) = row else {
            return Err(StoreError::NotFound(format!("civilian {id}")));
        };
        civilian_from_row(&row).map_err(decode)
    }

    async fn civilian_by_user(&self, user_id: UserId) -> Result<Option<Civilian>, StoreError> {
        self.civilian_where("civilian_by_user", "user_id", *user_id.as_uuid())
            .await
    }

    #[instrument(skip(self, patch), fields(user_id = %user_id), err)]
    async fn update_civilian_by_user(
        &self,
        user_id: UserId,
        patch: &CivilianPatch,
    ) -> Result<Civilian, StoreError> {
        let Some(mut civilian) = self.civilian_by_user(user_id).await? else {
            return Err(StoreError::NotFound(format!("civilian for user {user_id}")));
        };
        patch.apply_to(&mut civilian);

        let row = sqlx::query(&format!(
            "UPDATE civilians SET name = $2, phone = $3, address = $4, city = $5, state = $6, \
             pincode = $7, job = $8, salary = $9 WHERE id = $1 RETURNING {CIVILIAN_COLUMNS}"
        ))
        .bind(civilian.id.as_uuid())
        .bind(&civilian.name)
        .bind(&civilian.phone)
        .bind(&civilian.address)
        .bind(&civilian.city)
        .bind(&civilian.state)
        .bind(&civilian.pincode)
        .bind(&civilian.job)
        .bind(&civilian.salary)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_civilian", e))?;
        let Some(row) = row else {
            return Err(StoreError::NotFound(format!("civilian {}", civilian.id)));
        };
        civilian_from_row(&row).map_err(decode)
    }

    #[instrument(skip(self, complaint), fields(complaint_id = %complaint.id), err)]
    async fn insert_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO complaints ({COMPLAINT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {COMPLAINT_COLUMNS}"
        ))
        .bind(complaint.id.as_uuid())
        .bind(complaint.complainant_id.map(|id| *id.as_uuid()))
        .bind(complaint.officer_id.map(|id| *id.as_uuid()))
        .bind(&complaint.subject)
        .bind(&complaint.description)
        .bind(complaint.status.as_str())
        .bind(complaint.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_complaint", e))?;
        complaint_from_row(&row).map_err(decode)
    }

    async fn complaints_for_officer(&self, officer_id: OfficerId) -> Result<Vec<Complaint>, StoreError> {
        self.complaints_where("complaints_for_officer", "officer_id", *officer_id.as_uuid())
            .await
    }

    async fn complaints_by_complainant(
        &self,
        complainant_id: CivilianId,
    ) -> Result<Vec<Complaint>, StoreError> {
        self.complaints_where("complaints_by_complainant", "complainant_id", *complainant_id.as_uuid())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_metacharacters() {
        assert_eq!(like_pattern(" mumbai "), "%mumbai%");
        assert_eq!(like_pattern("100%_off"), "%100\\%\\_off%");
    }
}
