use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::policy::Ownership;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TherapistProfile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub clinic_id: Option<i64>,
    pub clinic_name: Option<String>,
    pub is_active: bool,
    pub date_added: DateTime<Utc>,
    pub assigned_clients_count: i64,
}

impl TherapistProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn ownership(&self) -> Ownership {
        Ownership {
            id: Some(self.id),
            clinic_id: self.clinic_id,
            therapist_email: self.email.clone(),
            email: self.email.clone(),
            ..Ownership::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTherapistRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub clinic_id: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTherapistRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub clinic_id: Option<i64>,
    pub is_active: Option<bool>,
}

impl UpdateTherapistRequest {
    /// Fields a therapist may not change on their own profile.
    pub fn touches_privileged_fields(&self) -> bool {
        self.email.is_some() || self.clinic_id.is_some() || self.is_active.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct TherapistFilter {
    pub clinic_id: Option<i64>,
    pub name: Option<String>,
}
