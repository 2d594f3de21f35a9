use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::policy::Ownership;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Child {
    pub id: i64,
    pub name: String,
    pub age: i32,
    pub gender: String,
    pub parent_id: i64,
    pub parent_name: Option<String>,
    #[serde(skip_serializing)]
    pub parent_email: Option<String>,
    pub assigned_therapist_id: Option<i64>,
    pub therapist_name: Option<String>,
    #[serde(skip_serializing)]
    pub therapist_email: Option<String>,
    pub clinic_id: i64,
    pub clinic_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Child {
    pub fn ownership(&self) -> Ownership {
        Ownership {
            id: Some(self.id),
            clinic_id: Some(self.clinic_id),
            therapist_email: self.therapist_email.clone(),
            parent_email: self.parent_email.clone(),
            ..Ownership::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateChildRequest {
    pub name: String,
    pub age: i32,
    pub gender: Option<Gender>,
    pub parent_id: i64,
    pub assigned_therapist_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateChildRequest {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub assigned_therapist_id: Option<i64>,
}
