//! Login accounts that follow therapist, client and clinic profiles.
//!
//! Profile services emit a [`ProfileEvent`] once their own write has
//! committed. Provisioning problems are logged and never undo that write.

use std::sync::Arc;

use rand::Rng;
use sqlx::PgPool;
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::user::Role,
    services::{
        auth::hash_password,
        email::{EmailService, WelcomeEmail},
        metrics,
    },
};

const TEMP_PASSWORD_LEN: usize = 12;
const TEMP_PASSWORD_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileEvent {
    Created {
        email: String,
        first_name: String,
        last_name: String,
        role: Role,
        clinic_id: Option<i64>,
    },
    Deleted {
        email: String,
        role: Role,
    },
}

/// What provisioning does with the account already holding an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountAction {
    Create,
    Refresh(i64),
    /// The account belongs to someone else's profile and is left as is.
    Keep(i64),
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ExistingAccount {
    id: i64,
    role_name: Option<String>,
    is_superuser: bool,
    /// The email is tied to a profile or clinic admin seat outside the target clinic.
    other_clinic: bool,
}

fn plan_account(existing: Option<&ExistingAccount>, role: Role) -> AccountAction {
    let Some(account) = existing else {
        return AccountAction::Create;
    };
    let current = account.role_name.as_deref().and_then(Role::from_name);
    if account.is_superuser || account.other_clinic || current.is_some_and(|r| r != role) {
        AccountAction::Keep(account.id)
    } else {
        AccountAction::Refresh(account.id)
    }
}

const EXISTING_ACCOUNT: &str = "SELECT u.id, r.name AS role_name, u.is_superuser,
        EXISTS (
            SELECT 1 FROM therapist_profiles t
             WHERE LOWER(t.email) = LOWER(u.email) AND t.clinic_id IS DISTINCT FROM $2
            UNION ALL
            SELECT 1 FROM parent_profiles p
             WHERE LOWER(p.parent_email) = LOWER(u.email) AND p.clinic_id IS DISTINCT FROM $2
            UNION ALL
            SELECT 1 FROM clinics c
             WHERE c.clinic_admin_id = u.id AND c.id IS DISTINCT FROM $2
        ) AS other_clinic
     FROM users u
     LEFT JOIN roles r ON r.id = u.role_id
     WHERE LOWER(u.email) = LOWER($1)";

/// Runs after the profile row is gone: only an account of the profile's role
/// that nothing else still points at is removed.
const DELETE_ORPHANED_ACCOUNT: &str = "DELETE FROM users u
     WHERE LOWER(u.email) = LOWER($1)
       AND u.is_superuser = FALSE
       AND u.role_id = (SELECT id FROM roles WHERE LOWER(name) = LOWER($2))
       AND NOT EXISTS (SELECT 1 FROM therapist_profiles t WHERE LOWER(t.email) = LOWER($1))
       AND NOT EXISTS (SELECT 1 FROM parent_profiles p WHERE LOWER(p.parent_email) = LOWER($1))
       AND NOT EXISTS (SELECT 1 FROM clinics c WHERE c.clinic_admin_id = u.id)";

pub struct IdentityService;

impl IdentityService {
    pub async fn dispatch(
        pool: &PgPool,
        config: &Config,
        email_svc: Option<Arc<EmailService>>,
        event: ProfileEvent,
    ) {
        match event {
            ProfileEvent::Created {
                email,
                first_name,
                last_name,
                role,
                clinic_id,
            } => {
                if email.trim().is_empty() || first_name.trim().is_empty() {
                    return;
                }
                if let Err(e) = Self::provision_account(
                    pool,
                    config,
                    email_svc,
                    &email,
                    &first_name,
                    &last_name,
                    role,
                    clinic_id,
                )
                .await
                {
                    warn!(email = %email, role = %role, error = %e, "account provisioning failed");
                }
            }
            ProfileEvent::Deleted { email, role } => {
                if email.trim().is_empty() {
                    return;
                }
                if let Err(e) = Self::delete_account(pool, &email, role).await {
                    warn!(email = %email, role = %role, error = %e, "account removal failed");
                }
            }
        }
    }

    /// Create the account for `email`, or refresh an existing one that already
    /// fits `role` within `clinic_id`. A fresh temporary password is set and
    /// mailed in both cases.
    ///
    /// Returns `None` when the email belongs to an account with another role,
    /// a superuser or a member of another clinic. That account is not touched.
    #[allow(clippy::too_many_arguments)]
    pub async fn provision_account(
        pool: &PgPool,
        config: &Config,
        email_svc: Option<Arc<EmailService>>,
        email: &str,
        first_name: &str,
        last_name: &str,
        role: Role,
        clinic_id: Option<i64>,
    ) -> AppResult<Option<i64>> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::validation("Email address is required to create a user account."));
        }

        let role_id: i64 = sqlx::query_scalar("SELECT id FROM roles WHERE LOWER(name) = LOWER($1)")
            .bind(role.as_name())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::validation(format!("Role \"{role}\" does not exist.")))?;

        let existing: Option<ExistingAccount> = sqlx::query_as(EXISTING_ACCOUNT)
            .bind(email)
            .bind(clinic_id)
            .fetch_optional(pool)
            .await?;

        let action = plan_account(existing.as_ref(), role);
        if let AccountAction::Keep(id) = action {
            warn!(user_id = id, role = %role, clinic_id, "email belongs to another account, left unchanged");
            return Ok(None);
        }

        let temp_password = generate_temp_password();
        let hash = hash_password(&temp_password)?;

        let user_id = match action {
            AccountAction::Refresh(id) => {
                sqlx::query(
                    "UPDATE users SET role_id = $1, password_hash = $2, password_reset_required = TRUE
                     WHERE id = $3",
                )
                .bind(role_id)
                .bind(&hash)
                .bind(id)
                .execute(pool)
                .await?;
                info!(user_id = id, role = %role, "existing account re-provisioned");
                id
            }
            _ => {
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO users (email, password_hash, first_name, last_name, role_id, password_reset_required)
                     VALUES ($1, $2, $3, $4, $5, TRUE)
                     RETURNING id",
                )
                .bind(email)
                .bind(&hash)
                .bind(first_name.trim())
                .bind(last_name.trim())
                .bind(role_id)
                .fetch_one(pool)
                .await?;
                info!(user_id = id, role = %role, "account provisioned");
                id
            }
        };

        let name = format!("{} {}", first_name.trim(), last_name.trim()).trim().to_string();
        let message = WelcomeEmail::render(&name, email, role, &temp_password, &config.reset_password_url(email));
        send_welcome_in_background(email_svc, email.to_string(), name, message);

        Ok(Some(user_id))
    }

    pub async fn delete_account(pool: &PgPool, email: &str, role: Role) -> AppResult<u64> {
        let result = sqlx::query(DELETE_ORPHANED_ACCOUNT)
            .bind(email.trim())
            .bind(role.as_name())
            .execute(pool)
            .await?;
        if result.rows_affected() > 0 {
            info!(email = %email, role = %role, "account removed with its profile");
        } else {
            info!(email = %email, role = %role, "account kept, still in use or of another role");
        }
        Ok(result.rows_affected())
    }
}

fn send_welcome_in_background(
    email_svc: Option<Arc<EmailService>>,
    to_email: String,
    to_name: String,
    message: WelcomeEmail,
) {
    let Some(svc) = email_svc else {
        metrics::WELCOME_EMAILS.with_label_values(&["skipped"]).inc();
        info!(email = %to_email, "SMTP not configured, welcome email skipped");
        return;
    };
    tokio::spawn(async move {
        match svc.send_welcome(&to_email, &to_name, &message).await {
            Ok(()) => metrics::WELCOME_EMAILS.with_label_values(&["sent"]).inc(),
            Err(e) => {
                metrics::WELCOME_EMAILS.with_label_values(&["failed"]).inc();
                warn!(email = %to_email, error = %e, "welcome email failed");
            }
        }
    });
}

pub fn generate_temp_password() -> String {
    let mut rng = rand::thread_rng();
    (0..TEMP_PASSWORD_LEN)
        .map(|_| TEMP_PASSWORD_ALPHABET[rng.gen_range(0..TEMP_PASSWORD_ALPHABET.len())] as char)
        .collect()
}

/// Split a contact person's name into first name and the rest.
pub fn split_contact_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();
    let first = parts.next().unwrap_or_default().to_string();
    let rest = parts.collect::<Vec<_>>().join(" ");
    (first, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_password_uses_allowed_alphabet() {
        for _ in 0..50 {
            let pw = generate_temp_password();
            assert_eq!(pw.len(), TEMP_PASSWORD_LEN);
            assert!(pw.bytes().all(|b| TEMP_PASSWORD_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn temp_passwords_differ() {
        assert_ne!(generate_temp_password(), generate_temp_password());
    }

    #[test]
    fn contact_name_splits_on_first_whitespace() {
        assert_eq!(split_contact_name("Jane van Dyke"), ("Jane".into(), "van Dyke".into()));
        assert_eq!(split_contact_name("  Cher "), ("Cher".into(), String::new()));
        assert_eq!(split_contact_name(""), (String::new(), String::new()));
    }

    fn account(role: Option<&str>) -> ExistingAccount {
        ExistingAccount {
            id: 42,
            role_name: role.map(str::to_string),
            is_superuser: false,
            other_clinic: false,
        }
    }

    #[test]
    fn new_email_gets_an_account() {
        assert_eq!(plan_account(None, Role::Therapist), AccountAction::Create);
    }

    #[test]
    fn matching_account_in_the_same_clinic_is_refreshed() {
        let acc = account(Some("therapist"));
        assert_eq!(plan_account(Some(&acc), Role::Therapist), AccountAction::Refresh(42));
        let unassigned = account(None);
        assert_eq!(plan_account(Some(&unassigned), Role::Parent), AccountAction::Refresh(42));
    }

    #[test]
    fn clinic_admin_account_is_not_taken_over_by_a_therapist_profile() {
        let admin = account(Some("clinic admin"));
        assert_eq!(plan_account(Some(&admin), Role::Therapist), AccountAction::Keep(42));
        assert_eq!(plan_account(Some(&admin), Role::Parent), AccountAction::Keep(42));
    }

    #[test]
    fn superusers_and_other_clinics_are_left_alone() {
        let root = ExistingAccount {
            is_superuser: true,
            ..account(Some("therapist"))
        };
        assert_eq!(plan_account(Some(&root), Role::Therapist), AccountAction::Keep(42));
        let elsewhere = ExistingAccount {
            other_clinic: true,
            ..account(Some("clinic admin"))
        };
        assert_eq!(plan_account(Some(&elsewhere), Role::ClinicAdmin), AccountAction::Keep(42));
    }

    #[test]
    fn account_removal_requires_role_and_no_remaining_profile() {
        let sql = DELETE_ORPHANED_ACCOUNT;
        assert!(sql.contains("u.is_superuser = FALSE"));
        assert!(sql.contains("u.role_id = (SELECT id FROM roles WHERE LOWER(name) = LOWER($2))"));
        assert!(sql.contains("NOT EXISTS (SELECT 1 FROM therapist_profiles t"));
        assert!(sql.contains("NOT EXISTS (SELECT 1 FROM parent_profiles p"));
        assert!(sql.contains("NOT EXISTS (SELECT 1 FROM clinics c WHERE c.clinic_admin_id = u.id)"));
    }

    #[tokio::test]
    async fn welcome_without_smtp_is_skipped_quietly() {
        let before = metrics::WELCOME_EMAILS.with_label_values(&["skipped"]).get();
        let mail = WelcomeEmail::render("A", "a@x", Role::Parent, "pw", "http://x");
        send_welcome_in_background(None, "a@x".into(), "A".into(), mail);
        let after = metrics::WELCOME_EMAILS.with_label_values(&["skipped"]).get();
        assert!(after >= before + 1.0);
    }
}
