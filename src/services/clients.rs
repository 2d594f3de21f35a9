use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        auth::Actor,
        client::{validate_age, ClientFilter, CreateClientRequest, ParentProfile, UpdateClientRequest},
        user::Role,
    },
    policy::{EntityKind, Operation, Ownership, PolicyEngine},
    services::{
        email::EmailService,
        identity::{IdentityService, ProfileEvent},
        scoped_one, scoped_select, therapist_fits_clinic,
        therapists::{normalize_email, TherapistService},
    },
};

pub(crate) const CLIENT_SELECT: &str = "SELECT p.*, cl.name AS clinic_name,
        NULLIF(TRIM(CONCAT(th.first_name, ' ', th.last_name)), '') AS therapist_name,
        th.email AS therapist_email,
        (SELECT COUNT(*) FROM children c2 WHERE c2.parent_id = p.id) AS children_count
     FROM parent_profiles p
     LEFT JOIN clinics cl ON cl.id = p.clinic_id
     LEFT JOIN therapist_profiles th ON th.id = p.assigned_therapist_id";

pub struct ClientService;

impl ClientService {
    pub async fn list(pool: &PgPool, actor: &Actor, filter: &ClientFilter) -> AppResult<Vec<ParentProfile>> {
        let mut qb = scoped_select(CLIENT_SELECT, actor, EntityKind::Client);
        if let Some(clinic_id) = filter.clinic_id {
            qb.push(" AND p.clinic_id = ").push_bind(clinic_id);
        }
        if let Some(therapist_id) = filter.therapist_id {
            qb.push(" AND p.assigned_therapist_id = ").push_bind(therapist_id);
        }
        if let Some(approval) = filter.fscd_approval {
            qb.push(" AND p.fscd_approval = ").push_bind(approval.as_str());
        }
        if let Some(age_min) = filter.age_min {
            qb.push(" AND p.age >= ").push_bind(age_min);
        }
        if let Some(age_max) = filter.age_max {
            qb.push(" AND p.age <= ").push_bind(age_max);
        }
        if let Some(name) = filter.name.as_deref().filter(|n| !n.trim().is_empty()) {
            let pattern = format!("%{}%", name.trim());
            qb.push(" AND (p.first_name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR p.last_name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY p.first_name, p.last_name");
        let rows = qb.build_query_as::<ParentProfile>().fetch_all(pool).await?;
        Ok(rows)
    }

    pub async fn find(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<Option<ParentProfile>> {
        scoped_one(pool, actor, EntityKind::Client, CLIENT_SELECT, id).await
    }

    pub async fn get(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<ParentProfile> {
        Self::find(pool, actor, id)
            .await?
            .ok_or_else(|| AppError::not_found("Client not found"))
    }

    /// Clients assigned to the calling therapist.
    pub async fn for_therapist(pool: &PgPool, actor: &Actor) -> AppResult<Vec<ParentProfile>> {
        let me = TherapistService::own_profile(pool, actor).await?;
        let rows = sqlx::query_as::<_, ParentProfile>(&format!(
            "{CLIENT_SELECT} WHERE p.assigned_therapist_id = $1 ORDER BY p.first_name, p.last_name"
        ))
        .bind(me.id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn create(
        pool: &PgPool,
        config: &Config,
        email_svc: Option<Arc<EmailService>>,
        actor: &Actor,
        req: &CreateClientRequest,
    ) -> AppResult<ParentProfile> {
        if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
            return Err(AppError::validation("First and last name are required"));
        }
        validate_age(req.age).map_err(AppError::Validation)?;
        let email = normalize_email(req.parent_email.as_deref());
        let clinic_id = PolicyEngine::creation_clinic(actor, req.clinic_id)?;
        PolicyEngine::authorize(
            actor,
            EntityKind::Client,
            Operation::Add,
            Some(&Ownership {
                clinic_id,
                parent_email: email.clone(),
                ..Ownership::default()
            }),
        )?;
        if let Some(therapist_id) = req.assigned_therapist_id {
            check_therapist_reference(pool, actor, therapist_id, clinic_id).await?;
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO parent_profiles (first_name, last_name, parent_email, phone_number, clinic_id,
                age, fscd_approval, assigned_therapist_id, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, COALESCE($7, 'approve'), $8, COALESCE($9, TRUE))
             RETURNING id",
        )
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(&email)
        .bind(&req.phone_number)
        .bind(clinic_id)
        .bind(req.age)
        .bind(req.fscd_approval.map(|a| a.as_str()))
        .bind(req.assigned_therapist_id)
        .bind(req.is_active)
        .fetch_one(pool)
        .await?;
        info!(client_id = id, user_id = actor.user_id, "client created");

        if let Some(email) = email {
            IdentityService::dispatch(
                pool,
                config,
                email_svc,
                ProfileEvent::Created {
                    email,
                    first_name: req.first_name.trim().to_string(),
                    last_name: req.last_name.trim().to_string(),
                    role: Role::Parent,
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
        req: &UpdateClientRequest,
    ) -> AppResult<ParentProfile> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Client, Operation::Change, Some(&current.ownership()))?;
        if actor.is_parent() && req.touches_privileged_fields() {
            return Err(AppError::forbidden(
                "Parents cannot change their email, therapist, clinic, approval or active status",
            ));
        }
        if req.clinic_id.is_some() && !actor.has_full_access() {
            return Err(AppError::forbidden("Only a superuser can move a client between clinics"));
        }
        validate_age(req.age).map_err(AppError::Validation)?;
        if [&req.first_name, &req.last_name]
            .iter()
            .any(|v| matches!(v.as_deref(), Some(s) if s.trim().is_empty()))
        {
            return Err(AppError::validation("Names cannot be empty"));
        }
        if let Some(therapist_id) = req.assigned_therapist_id {
            check_therapist_reference(pool, actor, therapist_id, req.clinic_id.or(current.clinic_id)).await?;
        }

        sqlx::query(
            "UPDATE parent_profiles
             SET first_name            = COALESCE($1, first_name),
                 last_name             = COALESCE($2, last_name),
                 parent_email          = COALESCE($3, parent_email),
                 phone_number          = COALESCE($4, phone_number),
                 clinic_id             = COALESCE($5, clinic_id),
                 age                   = COALESCE($6, age),
                 fscd_approval         = COALESCE($7, fscd_approval),
                 assigned_therapist_id = COALESCE($8, assigned_therapist_id),
                 is_active             = COALESCE($9, is_active)
             WHERE id = $10",
        )
        .bind(req.first_name.as_deref().map(str::trim))
        .bind(req.last_name.as_deref().map(str::trim))
        .bind(normalize_email(req.parent_email.as_deref()))
        .bind(&req.phone_number)
        .bind(req.clinic_id)
        .bind(req.age)
        .bind(req.fscd_approval.map(|a| a.as_str()))
        .bind(req.assigned_therapist_id)
        .bind(req.is_active)
        .bind(id)
        .execute(pool)
        .await?;

        // A changed therapist assignment can move the row out of a therapist's reach.
        match Self::find(pool, actor, id).await? {
            Some(client) => Ok(client),
            None => Err(AppError::not_found("Client not found")),
        }
    }

    pub async fn delete(pool: &PgPool, config: &Config, actor: &Actor, id: i64) -> AppResult<()> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Client, Operation::Delete, Some(&current.ownership()))?;
        sqlx::query("DELETE FROM parent_profiles WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        info!(client_id = id, user_id = actor.user_id, "client deleted");

        if let Some(email) = current.parent_email {
            IdentityService::dispatch(
                pool,
                config,
                None,
                ProfileEvent::Deleted {
                    email,
                    role: Role::Parent,
                },
            )
            .await;
        }
        Ok(())
    }
}

/// A referenced therapist must be visible to the actor and, when the client
/// has a clinic, belong to it.
async fn check_therapist_reference(
    pool: &PgPool,
    actor: &Actor,
    therapist_id: i64,
    clinic_id: Option<i64>,
) -> AppResult<()> {
    let therapist = TherapistService::find(pool, actor, therapist_id)
        .await?
        .ok_or_else(|| AppError::validation("Select a valid therapist."))?;
    if !therapist_fits_clinic(clinic_id, therapist.clinic_id) {
        return Err(AppError::validation("The therapist belongs to another clinic."));
    }
    Ok(())
}
