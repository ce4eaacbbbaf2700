use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use precinct_core::{OfficerId, StationId};

/// A police officer posted at a station.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Officer {
    pub id: OfficerId,
    pub name: String,
    pub rank: String,
    pub email: String,
    pub phone: String,
    pub age: u8,
    pub gender: String,
    pub description: Option<String>,
}

/// A police station with its posted officers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliceStation {
    pub id: StationId,
    pub name: String,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub officers: Vec<Officer>,
}

impl PoliceStation {
    /// Case-insensitive substring match over name, city and state.
    ///
    /// A blank query matches every station.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        [&self.name, &self.city, &self.state]
            .iter()
            .any(|field| field.to_lowercase().contains(&query))
    }

    pub fn officer(&self, id: OfficerId) -> Option<&Officer> {
        self.officers.iter().find(|o| o.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(name: &str, city: &str, state: &str) -> PoliceStation {
        PoliceStation {
            id: StationId::new(),
            name: name.to_string(),
            address: String::new(),
            city: city.to_string(),
            state: state.to_string(),
            zip_code: String::new(),
            phone: None,
            email: None,
            latitude: None,
            longitude: None,
            created_at: Utc::now(),
            officers: vec![],
        }
    }

    #[test]
    fn search_is_case_insensitive_across_fields() {
        let s = station("Bandra Local Police Station", "Mumbai", "Maharashtra");
        assert!(s.matches("bandra"));
        assert!(s.matches("MUMBAI"));
        assert!(s.matches("  mahara "));
        assert!(s.matches(""));
        assert!(!s.matches("Delhi"));
    }
}
