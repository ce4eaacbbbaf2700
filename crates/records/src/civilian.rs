use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use precinct_core::{CivilianId, CrimeId, DomainResult, UserId, require_text};

/// A civilian on record. `user_id` links the record to a signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Civilian {
    pub id: CivilianId,
    pub user_id: Option<UserId>,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub job: Option<String>,
    pub salary: Option<String>,
    pub is_criminal: bool,
    pub created_at: DateTime<Utc>,
}

impl Civilian {
    pub fn new(name: impl Into<String>, user_id: Option<UserId>, now: DateTime<Utc>) -> Self {
        Self {
            id: CivilianId::new(),
            user_id,
            name: name.into(),
            phone: None,
            address: None,
            city: None,
            state: None,
            pincode: None,
            job: None,
            salary: None,
            is_criminal: false,
            created_at: now,
        }
    }
}

/// A single offence on a criminal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crime {
    pub id: CrimeId,
    pub description: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriminalRecord {
    pub civilian: Civilian,
    pub crimes: Vec<Crime>,
}

/// Self-service changes to a civilian record.
///
/// `None` keeps the existing value. `user_id` and `is_criminal` are not
/// editable through a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivilianPatch {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
    pub job: Option<String>,
    pub salary: Option<String>,
}

impl CivilianPatch {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, civilian: &mut Civilian) {
        fn set(target: &mut Option<String>, value: &Option<String>) {
            if let Some(value) = value {
                let value = value.trim();
                *target = (!value.is_empty()).then(|| value.to_string());
            }
        }

        if let Some(name) = &self.name {
            civilian.name = name.trim().to_string();
        }
        set(&mut civilian.phone, &self.phone);
        set(&mut civilian.address, &self.address);
        set(&mut civilian.city, &self.city);
        set(&mut civilian.state, &self.state);
        set(&mut civilian.pincode, &self.pincode);
        set(&mut civilian.job, &self.job);
        set(&mut civilian.salary, &self.salary);
    }
}
