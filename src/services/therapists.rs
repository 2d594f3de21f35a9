use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        auth::Actor,
        therapist::{CreateTherapistRequest, TherapistFilter, TherapistProfile, UpdateTherapistRequest},
        user::Role,
    },
    policy::{EntityKind, Operation, Ownership, PolicyEngine},
    services::{
        email::EmailService,
        identity::{IdentityService, ProfileEvent},
        scoped_one, scoped_select,
    },
};

const THERAPIST_SELECT: &str = "SELECT t.*, cl.name AS clinic_name,
        (SELECT COUNT(*) FROM parent_profiles pp WHERE pp.assigned_therapist_id = t.id) AS assigned_clients_count
     FROM therapist_profiles t
     LEFT JOIN clinics cl ON cl.id = t.clinic_id";

pub struct TherapistService;

impl TherapistService {
    pub async fn list(pool: &PgPool, actor: &Actor, filter: &TherapistFilter) -> AppResult<Vec<TherapistProfile>> {
        let mut qb = scoped_select(THERAPIST_SELECT, actor, EntityKind::Therapist);
        if let Some(clinic_id) = filter.clinic_id {
            qb.push(" AND t.clinic_id = ").push_bind(clinic_id);
        }
        if let Some(name) = filter.name.as_deref().filter(|n| !n.trim().is_empty()) {
            let pattern = format!("%{}%", name.trim());
            qb.push(" AND (t.first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR t.last_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY t.first_name, t.last_name");
        let rows = qb.build_query_as::<TherapistProfile>().fetch_all(pool).await?;
        Ok(rows)
    }

    /// A therapist the actor can see, or `None`. Used to vet references.
    pub async fn find(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<Option<TherapistProfile>> {
        scoped_one(pool, actor, EntityKind::Therapist, THERAPIST_SELECT, id).await
    }

    pub async fn get(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<TherapistProfile> {
        Self::find(pool, actor, id)
            .await?
            .ok_or_else(|| AppError::not_found("Therapist not found"))
    }

    /// Own profile of a therapist actor, matched by email.
    pub async fn own_profile(pool: &PgPool, actor: &Actor) -> AppResult<TherapistProfile> {
        if !actor.is_therapist() {
            return Err(AppError::forbidden("Only therapists have a therapist profile"));
        }
        sqlx::query_as::<_, TherapistProfile>(&format!(
            "{THERAPIST_SELECT} WHERE LOWER(t.email) = LOWER($1) ORDER BY t.id LIMIT 1"
        ))
        .bind(&actor.email)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::ProfileNotFound("Therapist profile not found.".into()))
    }

    pub async fn create(
        pool: &PgPool,
        config: &Config,
        email_svc: Option<Arc<EmailService>>,
        actor: &Actor,
        req: &CreateTherapistRequest,
    ) -> AppResult<TherapistProfile> {
        if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
            return Err(AppError::validation("First and last name are required"));
        }
        let email = normalize_email(req.email.as_deref());
        let clinic_id = PolicyEngine::creation_clinic(actor, req.clinic_id)?;
        PolicyEngine::authorize(
            actor,
            EntityKind::Therapist,
            Operation::Add,
            Some(&Ownership {
                clinic_id,
                therapist_email: email.clone(),
                email: email.clone(),
                ..Ownership::default()
            }),
        )?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO therapist_profiles (first_name, last_name, email, phone_number, clinic_id, is_active)
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, TRUE))
             RETURNING id",
        )
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(&email)
        .bind(&req.phone_number)
        .bind(clinic_id)
        .bind(req.is_active)
        .fetch_one(pool)
        .await?;
        info!(therapist_id = id, user_id = actor.user_id, "therapist created");

        if let Some(email) = email {
            IdentityService::dispatch(
                pool,
                config,
                email_svc,
                ProfileEvent::Created {
                    email,
                    first_name: req.first_name.trim().to_string(),
                    last_name: req.last_name.trim().to_string(),
                    role: Role::Therapist,
                    clinic_id,
                },
            )
            .await;
        }

        Self::get(pool, actor, id).await
    }

    pub async fn update(
        pool: &PgPool,
        actor: &Actor,
        id: i64,
        req: &UpdateTherapistRequest,
    ) -> AppResult<TherapistProfile> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Therapist, Operation::Change, Some(&current.ownership()))?;
        if actor.is_therapist() && req.touches_privileged_fields() {
            return Err(AppError::forbidden(
                "Therapists cannot change their email, clinic or active status",
            ));
        }
        if req.clinic_id.is_some() && !actor.has_full_access() {
            return Err(AppError::forbidden("Only a superuser can move a therapist between clinics"));
        }
        if [&req.first_name, &req.last_name]
            .iter()
            .any(|v| matches!(v.as_deref(), Some(s) if s.trim().is_empty()))
        {
            return Err(AppError::validation("Names cannot be empty"));
        }

        sqlx::query(
            "UPDATE therapist_profiles
             SET first_name   = COALESCE($1, first_name),
                 last_name    = COALESCE($2, last_name),
                 email        = COALESCE($3, email),
                 phone_number = COALESCE($4, phone_number),
                 clinic_id    = COALESCE($5, clinic_id),
                 is_active    = COALESCE($6, is_active)
             WHERE id = $7",
        )
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(normalize_email(req.email.as_deref()))
        .bind(&req.phone_number)
        .bind(req.clinic_id)
        .bind(req.is_active)
        .bind(id)
        .execute(pool)
        .await?;

        Self::get(pool, actor, id).await
    }

    pub async fn delete(pool: &PgPool, config: &Config, actor: &Actor, id: i64) -> AppResult<()> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Therapist, Operation::Delete, Some(&current.ownership()))?;
        sqlx::query("DELETE FROM therapist_profiles WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        info!(therapist_id = id, user_id = actor.user_id, "therapist deleted");

        if let Some(email) = current.email {
            IdentityService::dispatch(
                pool,
                config,
                None,
                ProfileEvent::Deleted {
                    email,
                    role: Role::Therapist,
                },
            )
            .await;
        }
        Ok(())
    }
}

pub(crate) fn normalize_email(email: Option<&str>) -> Option<String> {
    email.map(str::trim).filter(|e| !e.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_emails_are_dropped() {
        assert_eq!(normalize_email(Some("  ")), None);
        assert_eq!(normalize_email(Some(" t@x ")), Some("t@x".into()));
        assert_eq!(normalize_email(None), None);
    }
}
