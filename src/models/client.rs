use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::policy::Ownership;

/// A client is a parent profile: the account holder whose child receives therapy.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParentProfile {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub parent_email: Option<String>,
    pub phone_number: Option<String>,
    pub clinic_id: Option<i64>,
    pub clinic_name: Option<String>,
    pub age: Option<i32>,
    pub fscd_approval: String,
    pub assigned_therapist_id: Option<i64>,
    pub therapist_name: Option<String>,
    /// Email of the assigned therapist, used for scoping only.
    #[serde(skip_serializing)]
    pub therapist_email: Option<String>,
    pub is_active: bool,
    pub date_added: DateTime<Utc>,
    pub children_count: i64,
}

impl ParentProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn ownership(&self) -> Ownership {
        Ownership {
            id: Some(self.id),
            clinic_id: self.clinic_id,
            therapist_email: self.therapist_email.clone(),
            parent_email: self.parent_email.clone(),
            ..Ownership::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FscdApproval {
    Approve,
    Reject,
}

impl FscdApproval {
    pub fn as_str(&self) -> &'static str {
        match self {
            FscdApproval::Approve => "approve",
            FscdApproval::Reject => "reject",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub first_name: String,
    pub last_name: String,
    pub parent_email: Option<String>,
    pub phone_number: Option<String>,
    pub clinic_id: Option<i64>,
    pub age: Option<i32>,
    pub fscd_approval: Option<FscdApproval>,
    pub assigned_therapist_id: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateClientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub parent_email: Option<String>,
    pub phone_number: Option<String>,
    pub clinic_id: Option<i64>,
    pub age: Option<i32>,
    pub fscd_approval: Option<FscdApproval>,
    pub assigned_therapist_id: Option<i64>,
    pub is_active: Option<bool>,
}

impl UpdateClientRequest {
    /// Fields a parent may not change on their own profile.
    pub fn touches_privileged_fields(&self) -> bool {
        self.parent_email.is_some()
            || self.assigned_therapist_id.is_some()
            || self.fscd_approval.is_some()
            || self.clinic_id.is_some()
            || self.is_active.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ClientFilter {
    pub clinic_id: Option<i64>,
    pub therapist_id: Option<i64>,
    pub fscd_approval: Option<FscdApproval>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub name: Option<String>,
}

pub fn validate_age(age: Option<i32>) -> Result<(), String> {
    match age {
        Some(a) if !(1..=100).contains(&a) => Err("Age must be between 1 and 100".into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_bounds() {
        assert!(validate_age(None).is_ok());
        assert!(validate_age(Some(1)).is_ok());
        assert!(validate_age(Some(100)).is_ok());
        assert!(validate_age(Some(0)).is_err());
        assert!(validate_age(Some(101)).is_err());
    }

    #[test]
    fn parent_may_edit_contact_details_only() {
        let req = UpdateClientRequest {
            phone_number: Some("555".into()),
            ..UpdateClientRequest::default()
        };
        assert!(!req.touches_privileged_fields());
        let req = UpdateClientRequest {
            fscd_approval: Some(FscdApproval::Approve),
            ..UpdateClientRequest::default()
        };
        assert!(req.touches_privileged_fields());
    }
}
