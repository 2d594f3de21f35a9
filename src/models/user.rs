use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::policy::Ownership;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    ClinicAdmin,
    Therapist,
    Parent,
}

impl Role {
    /// Name stored in the `roles` table.
    pub fn as_name(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super admin",
            Role::ClinicAdmin => "clinic admin",
            Role::Therapist => "therapist",
            Role::Parent => "parent",
        }
    }

    /// Case-insensitive lookup of a stored role name. Unknown names are `None`.
    pub fn from_name(name: &str) -> Option<Role> {
        match name.trim().to_lowercase().as_str() {
            "super admin" => Some(Role::SuperAdmin),
            "clinic admin" => Some(Role::ClinicAdmin),
            "therapist" => Some(Role::Therapist),
            "parent" => Some(Role::Parent),
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "Super Admin",
            Role::ClinicAdmin => "Clinic Admin",
            Role::Therapist => "Therapist",
            Role::Parent => "Parent",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_name())
    }
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::from_name(s).ok_or_else(|| anyhow::anyhow!("Unknown role: {s}"))
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RoleRow {
    pub id: i64,
    pub name: String,
}

/// DB row struct. `role_name` comes from a LEFT JOIN on `roles` and is NULL
/// for accounts without a role.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role_name: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
    pub password_reset_required: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn role(&self) -> Option<Role> {
        self.role_name.as_deref().and_then(Role::from_name)
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }

    pub fn ownership(&self) -> Ownership {
        Ownership {
            id: Some(self.id),
            email: Some(self.email.clone()),
            ..Ownership::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RefreshToken {
    pub id: uuid::Uuid,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

// Request/Response DTOs
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub role_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            full_name: u.full_name(),
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            role_name: u.role_name,
            is_active: u.is_active,
            created_at: u.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// First-login flow: trade the emailed temporary password for a real one.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub temp_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

impl UpdateUserRequest {
    /// Role and activation changes are reserved to superusers.
    pub fn touches_privileged_fields(&self) -> bool {
        self.role.is_some() || self.is_active.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_names_parse_case_insensitively() {
        assert_eq!(Role::from_name("Clinic Admin"), Some(Role::ClinicAdmin));
        assert_eq!(Role::from_name("  THERAPIST "), Some(Role::Therapist));
        assert_eq!(Role::from_name("super admin"), Some(Role::SuperAdmin));
        assert_eq!(Role::from_name("neuvii_admin"), None);
    }

    #[test]
    fn role_name_round_trips_through_display() {
        for role in [Role::SuperAdmin, Role::ClinicAdmin, Role::Therapist, Role::Parent] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
    }
}
