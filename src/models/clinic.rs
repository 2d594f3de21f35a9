use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::policy::Ownership;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Clinic {
    pub id: i64,
    pub name: String,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_person_name: Option<String>,
    pub contact_role: Option<String>,
    pub email: Option<String>,
    pub clinic_admin_id: Option<i64>,
    /// Full name of the linked admin account, joined from `users`.
    pub clinic_admin_name: Option<String>,
    pub agreement_signed: bool,
    pub license_status: Option<String>,
    pub internal_notes: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Clinic {
    pub fn ownership(&self) -> Ownership {
        Ownership {
            id: Some(self.id),
            clinic_id: Some(self.id),
            clinic_admin_id: self.clinic_admin_id,
            ..Ownership::default()
        }
    }

    /// Whether saving this clinic should provision an admin account.
    pub fn needs_admin(&self) -> bool {
        self.clinic_admin_id.is_none()
            && self.contact_person_name.as_deref().is_some_and(|s| !s.trim().is_empty())
            && self.email.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LicenseStatus {
    Active,
    Inactive,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "Active",
            LicenseStatus::Inactive => "Inactive",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateClinicRequest {
    pub name: String,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_person_name: Option<String>,
    pub contact_role: Option<String>,
    pub email: Option<String>,
    pub clinic_admin_id: Option<i64>,
    pub agreement_signed: Option<bool>,
    pub license_status: Option<LicenseStatus>,
    pub internal_notes: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateClinicRequest {
    pub name: Option<String>,
    pub address_line_1: Option<String>,
    pub address_line_2: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub contact_person_name: Option<String>,
    pub contact_role: Option<String>,
    pub email: Option<String>,
    pub clinic_admin_id: Option<i64>,
    pub agreement_signed: Option<bool>,
    pub license_status: Option<LicenseStatus>,
    pub internal_notes: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateClinicRequest {
    /// Fields a clinic admin may not edit on their own clinic.
    pub fn touches_privileged_fields(&self) -> bool {
        self.clinic_admin_id.is_some()
            || self.license_status.is_some()
            || self.agreement_signed.is_some()
            || self.internal_notes.is_some()
            || self.is_active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clinic() -> Clinic {
        let now = Utc::now();
        Clinic {
            id: 1,
            name: "North".into(),
            address_line_1: None,
            address_line_2: None,
            city: None,
            country: None,
            contact_person_name: Some("Jane van Dyke".into()),
            contact_role: None,
            email: Some("jane@north.test".into()),
            clinic_admin_id: None,
            clinic_admin_name: None,
            agreement_signed: false,
            license_status: None,
            internal_notes: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admin_is_provisioned_only_when_contact_is_complete() {
        let mut c = clinic();
        assert!(c.needs_admin());
        c.email = Some("  ".into());
        assert!(!c.needs_admin());
        let mut c = clinic();
        c.clinic_admin_id = Some(5);
        assert!(!c.needs_admin());
    }
}
