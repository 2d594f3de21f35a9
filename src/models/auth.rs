use serde::{Deserialize, Serialize};

use super::user::Role;

/// Claims embedded in the JWT access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub role: Option<Role>,
    pub exp: usize,
    pub iat: usize,
}

/// Claims embedded in the JWT refresh token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String, // user id
    pub jti: String, // refresh token UUID (to enable revocation)
    pub exp: usize,
    pub iat: usize,
}

/// Role of the requesting identity, resolved once per request.
///
/// A clinic admin carries the clinic they manage; `None` means the lookup
/// came back empty and every clinic-scoped query resolves to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    SuperAdmin,
    ClinicAdmin { clinic_id: Option<i64> },
    Therapist,
    Parent,
    Unassigned,
}

impl ActorRole {
    pub fn from_role(role: Option<Role>, managed_clinic: Option<i64>) -> Self {
        match role {
            Some(Role::SuperAdmin) => ActorRole::SuperAdmin,
            Some(Role::ClinicAdmin) => ActorRole::ClinicAdmin { clinic_id: managed_clinic },
            Some(Role::Therapist) => ActorRole::Therapist,
            Some(Role::Parent) => ActorRole::Parent,
            None => ActorRole::Unassigned,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActorRole::SuperAdmin => "super admin",
            ActorRole::ClinicAdmin { .. } => "clinic admin",
            ActorRole::Therapist => "therapist",
            ActorRole::Parent => "parent",
            ActorRole::Unassigned => "unassigned",
        }
    }
}

/// The authenticated identity issuing a request. Available via Axum extractors.
#[derive(Debug, Clone)]
pub struct Actor {
    pub user_id: i64,
    pub email: String,
    pub is_superuser: bool,
    pub role: ActorRole,
}

impl Actor {
    /// The superuser flag and the super admin role both grant full access.
    pub fn has_full_access(&self) -> bool {
        self.is_superuser || self.role == ActorRole::SuperAdmin
    }

    pub fn managed_clinic(&self) -> Option<i64> {
        match self.role {
            ActorRole::ClinicAdmin { clinic_id } => clinic_id,
            _ => None,
        }
    }

    pub fn is_therapist(&self) -> bool {
        self.role == ActorRole::Therapist
    }

    pub fn is_parent(&self) -> bool {
        self.role == ActorRole::Parent
    }
}
