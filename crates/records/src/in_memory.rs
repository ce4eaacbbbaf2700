//! In-memory record repository.
//!
//! Intended for tests/dev. [`InMemoryRecordRepository::with_demo_data`]
//! seeds a small set of stations, civilians and complaints.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use precinct_auth::StoreError;
use precinct_core::{CivilianId, ComplaintId, CrimeId, OfficerId, StationId, UserId};

use crate::complaint::sort_newest_first;
use crate::{
    Civilian, CivilianPatch, Complaint, ComplaintStatus, Crime, CriminalRecord, Officer,
    PoliceStation, RecordRepository,
};

#[derive(Debug, Default)]
struct Tables {
    stations: Vec<PoliceStation>,
    civilians: HashMap<CivilianId, Civilian>,
    crimes: HashMap<CivilianId, Vec<Crime>>,
    complaints: Vec<Complaint>,
}

#[derive(Debug, Default)]
pub struct InMemoryRecordRepository {
    tables: RwLock<Tables>,
}

fn poisoned() -> StoreError {
    StoreError::Transport("lock poisoned".to_string())
}

impl InMemoryRecordRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_station(&self, station: PoliceStation) {
        if let Ok(mut tables) = self.tables.write() {
            tables.stations.push(station);
        }
    }

    pub fn insert_civilian(&self, civilian: Civilian) {
        if let Ok(mut tables) = self.tables.write() {
            tables.civilians.insert(civilian.id, civilian);
        }
    }

    pub fn add_crime(&self, civilian_id: CivilianId, crime: Crime) {
        if let Ok(mut tables) = self.tables.write() {
            tables.crimes.entry(civilian_id).or_default().push(crime);
        }
    }

    pub fn complaint_count(&self) -> usize {
        self.tables.read().map(|t| t.complaints.len()).unwrap_or(0)
    }

    /// Stations, officers, civilians, one criminal record and complaints.
    pub fn with_demo_data() -> Self {
        let repo = Self::new();
        let seeded = timestamp(2023, 9, 1, 9, 0);

        let stations = [
            ("Amritapuri Police Station", "Amritapuri", "Kerala", "Kerala", "0476-123456",
                ("Sarfaraz Khan", "Assistant Superintendent", "sarfarazkhan@example.com", "7788665544", 26, "Male", Some("I hate crime"))),
            ("Amritsar Central Police Station", "Preet Nagar", "Amritsar", "Punjab", "0183-987654",
                ("Rajinder Singh", "Inspector", "rsingh@example.com", "9988776655", 32, "Male", None)),
            ("Bandra Local Police Station", "Bandra", "Mumbai", "Maharashtra", "022-8765432",
                ("Priya Sharma", "Sub-Inspector", "psharma@example.com", "7654321098", 29, "Female", None)),
            ("Dwarka Mor Police Station", "Dwarka Mor", "New Delhi", "Delhi", "011-23456789",
                ("Vikram Khanna", "Station House Officer", "vkhanna@example.com", "9876543210", 35, "Male", None)),
        ];

        let mut officer_ids = Vec::new();
        for (name, area, city, state, phone, officer) in stations {
            let (o_name, rank, email, o_phone, age, gender, description) = officer;
            let officer = Officer {
                id: OfficerId::new(),
                name: o_name.to_string(),
                rank: rank.to_string(),
                email: email.to_string(),
                phone: o_phone.to_string(),
                age,
                gender: gender.to_string(),
                description: description.map(str::to_string),
            };
            officer_ids.push(officer.id);
            repo.insert_station(PoliceStation {
                id: StationId::new(),
                name: name.to_string(),
                address: area.to_string(),
                city: city.to_string(),
                state: state.to_string(),
                zip_code: String::new(),
                phone: Some(phone.to_string()),
                email: None,
                latitude: None,
                longitude: None,
                created_at: seeded,
                officers: vec![officer],
            });
        }

        let manan = demo_civilian(
            "Manan Vohra", "9911223344", "12, Domlur", "Bangalore", "Karnataka", "560071",
            Some(("Software Engineer", "1200000")), seeded,
        );
        let ananya = demo_civilian(
            "Ananya Patel", "8877665544", "45, Indiranagar", "Bangalore", "Karnataka", "560038",
            Some(("Doctor", "1800000")), seeded,
        );
        let mut rakesh = demo_civilian(
            "Rakesh Kumar", "7766554433", "7, Malviya Nagar", "Delhi", "Delhi", "110017",
            None, seeded,
        );
        rakesh.is_criminal = true;

        repo.add_crime(rakesh.id, crime("Theft", day(2023, 5, 15)));
        repo.add_crime(rakesh.id, crime("Assault", day(2023, 8, 22)));

        let complaints = [
            (0, manan.id, "Punctuality", "Does not arrive on time in police station", timestamp(2023, 9, 10, 10, 30)),
            (0, ananya.id, "FIR handling", "Did not handle my FIR properly!", timestamp(2023, 9, 12, 14, 45)),
            (1, manan.id, "Punctuality", "Comes late for duty", timestamp(2023, 9, 15, 9, 15)),
        ];
        if let Ok(mut tables) = repo.tables.write() {
            for (officer, complainant, subject, description, at) in complaints {
                tables.complaints.push(Complaint {
                    id: ComplaintId::new(),
                    complainant_id: Some(complainant),
                    officer_id: officer_ids.get(officer).copied(),
                    subject: subject.to_string(),
                    description: description.to_string(),
                    status: ComplaintStatus::Open,
                    created_at: at,
                });
            }
        }

        for civilian in [manan, ananya, rakesh] {
            repo.insert_civilian(civilian);
        }
        repo
    }
}

#[allow(clippy::too_many_arguments)]
fn demo_civilian(
    name: &str,
    phone: &str,
    address: &str,
    city: &str,
    state: &str,
    pincode: &str,
    job: Option<(&str, &str)>,
    at: DateTime<Utc>,
) -> Civilian {
    let mut civilian = Civilian::new(name, None, at);
    civilian.phone = Some(phone.to_string());
    civilian.address = Some(address.to_string());
    civilian.city = Some(city.to_string());
    civilian.state = Some(state.to_string());
    civilian.pincode = Some(pincode.to_string());
    if let Some((job, salary)) = job {
        civilian.job = Some(job.to_string());
        civilian.salary = Some(salary.to_string());
    }
    civilian
}

fn crime(description: &str, date: NaiveDate) -> Crime {
    Crime {
        id: CrimeId::new(),
        description: description.to_string(),
        date,
    }
}

fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn timestamp(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_default()
}

#[async_trait]
impl RecordRepository for InMemoryRecordRepository {
    async fn list_stations(&self) -> Result<Vec<PoliceStation>, StoreError> {
        Ok(self.tables.read().map_err(|_| poisoned())?.stations.clone())
    }

    async fn get_station(&self, id: StationId) -> Result<Option<PoliceStation>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables.stations.iter().find(|s| s.id == id).cloned())
    }

    async fn search_stations(&self, query: &str) -> Result<Vec<PoliceStation>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .stations
            .iter()
            .filter(|s| s.matches(query))
            .cloned()
            .collect())
    }

    async fn list_civilians(&self) -> Result<Vec<Civilian>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut civilians: Vec<Civilian> = tables.civilians.values().cloned().collect();
        civilians.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(civilians)
    }

    async fn list_criminals(&self) -> Result<Vec<CriminalRecord>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut records: Vec<CriminalRecord> = tables
            .civilians
            .values()
            .filter(|c| c.is_criminal)
            .map(|c| CriminalRecord {
                civilian: c.clone(),
                crimes: tables.crimes.get(&c.id).cloned().unwrap_or_default(),
            })
            .collect();
        records.sort_by(|a, b| a.civilian.name.cmp(&b.civilian.name));
        Ok(records)
    }

    async fn set_criminal_status(
        &self,
        id: CivilianId,
        is_criminal: bool,
    ) -> Result<Civilian, StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let civilian = tables
            .civilians
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("civilian {id}")))?;
        civilian.is_criminal = is_criminal;
        Ok(civilian.clone())
    }

    async fn civilian_by_user(&self, user_id: UserId) -> Result<Option<Civilian>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        Ok(tables
            .civilians
            .values()
            .find(|c| c.user_id == Some(user_id))
            .cloned())
    }

    async fn update_civilian_by_user(
        &self,
        user_id: UserId,
        patch: &CivilianPatch,
    ) -> Result<Civilian, StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        let civilian = tables
            .civilians
            .values_mut()
            .find(|c| c.user_id == Some(user_id))
            .ok_or_else(|| StoreError::NotFound(format!("civilian for user {user_id}")))?;
        patch.apply_to(civilian);
        Ok(civilian.clone())
    }

    async fn insert_complaint(&self, complaint: Complaint) -> Result<Complaint, StoreError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        if tables.complaints.iter().any(|c| c.id == complaint.id) {
            return Err(StoreError::Constraint(format!("complaint {} already exists", complaint.id)));
        }
        tables.complaints.push(complaint.clone());
        Ok(complaint)
    }

    async fn complaints_for_officer(&self, officer_id: OfficerId) -> Result<Vec<Complaint>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut complaints: Vec<Complaint> = tables
            .complaints
            .iter()
            .filter(|c| c.officer_id == Some(officer_id))
            .cloned()
            .collect();
        sort_newest_first(&mut complaints);
        Ok(complaints)
    }

    async fn complaints_by_complainant(
        &self,
        complainant_id: CivilianId,
    ) -> Result<Vec<Complaint>, StoreError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let mut complaints: Vec<Complaint> = tables
            .complaints
            .iter()
            .filter(|c| c.complainant_id == Some(complainant_id))
            .cloned()
            .collect();
        sort_newest_first(&mut complaints);
        Ok(complaints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_data_is_consistent() {
        let repo = InMemoryRecordRepository::with_demo_data();

        let stations = repo.list_stations().await.expect("stations");
        assert_eq!(stations.len(), 4);
        assert!(stations.iter().all(|s| s.officers.len() == 1));

        let criminals = repo.list_criminals().await.expect("criminals");
        assert_eq!(criminals.len(), 1);
        assert_eq!(criminals[0].civilian.name, "Rakesh Kumar");
        assert_eq!(criminals[0].crimes.len(), 2);

        let first_officer = stations[0].officers[0].id;
        let complaints = repo.complaints_for_officer(first_officer).await.expect("complaints");
        assert_eq!(complaints.len(), 2);
        assert!(complaints[0].created_at > complaints[1].created_at);
    }

    #[tokio::test]
    async fn search_matches_city_and_state() {
        let repo = InMemoryRecordRepository::with_demo_data();
        let found = repo.search_stations("delhi").await.expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Dwarka Mor Police Station");
        assert!(repo.search_stations("atlantis").await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn criminal_status_of_unknown_civilian_is_not_found() {
        let repo = InMemoryRecordRepository::new();
        let err = repo
            .set_criminal_status(CivilianId::new(), true)
            .await
            .expect_err("missing civilian");
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
