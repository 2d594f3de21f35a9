use std::sync::Arc;

use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        auth::Actor,
        clinic::{Clinic, CreateClinicRequest, UpdateClinicRequest},
        user::Role,
    },
    policy::{EntityKind, Operation, PolicyEngine},
    services::{
        email::EmailService,
        identity::{split_contact_name, IdentityService},
        users::UserService,
    },
};

const CLINIC_SELECT: &str = "SELECT c.*,
        NULLIF(TRIM(CONCAT(u.first_name, ' ', u.last_name)), '') AS clinic_admin_name
     FROM clinics c
     LEFT JOIN users u ON u.id = c.clinic_admin_id";

pub struct ClinicService;

impl ClinicService {
    pub async fn list(pool: &PgPool, actor: &Actor) -> AppResult<Vec<Clinic>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("{CLINIC_SELECT} WHERE "));
        PolicyEngine::scope(actor, EntityKind::Clinic).push_filter(&mut qb, &EntityKind::Clinic.columns());
        qb.push(" ORDER BY c.name");
        let clinics = qb.build_query_as::<Clinic>().fetch_all(pool).await?;
        Ok(clinics)
    }

    pub async fn get(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<Clinic> {
        let clinic = Self::fetch(pool, id)
            .await?
            .ok_or_else(|| AppError::not_found("Clinic not found"))?;
        PolicyEngine::authorize(actor, EntityKind::Clinic, Operation::Read, Some(&clinic.ownership()))?;
        Ok(clinic)
    }

    async fn fetch(pool: &PgPool, id: i64) -> AppResult<Option<Clinic>> {
        let clinic = sqlx::query_as::<_, Clinic>(&format!("{CLINIC_SELECT} WHERE c.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(clinic)
    }

    pub async fn create(
        pool: &PgPool,
        config: &Config,
        email_svc: Option<Arc<EmailService>>,
        actor: &Actor,
        req: &CreateClinicRequest,
    ) -> AppResult<Clinic> {
        PolicyEngine::authorize(actor, EntityKind::Clinic, Operation::Add, None)?;
        if req.name.trim().is_empty() {
            return Err(AppError::validation("Clinic name is required"));
        }
        if let Some(admin_id) = req.clinic_admin_id {
            Self::check_admin_candidate(pool, admin_id).await?;
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO clinics (name, address_line_1, address_line_2, city, country,
                contact_person_name, contact_role, email, clinic_admin_id, agreement_signed,
                license_status, internal_notes, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, FALSE), $11, $12, COALESCE($13, TRUE))
             RETURNING id",
        )
        .bind(req.name.trim())
        .bind(&req.address_line_1)
        .bind(&req.address_line_2)
        .bind(&req.city)
        .bind(&req.country)
        .bind(&req.contact_person_name)
        .bind(&req.contact_role)
        .bind(req.email.as_deref().map(str::trim))
        .bind(req.clinic_admin_id)
        .bind(req.agreement_signed)
        .bind(req.license_status.map(|s| s.as_str()))
        .bind(&req.internal_notes)
        .bind(req.is_active)
        .fetch_one(pool)
        .await?;
        info!(clinic_id = id, user_id = actor.user_id, "clinic created");

        Self::onboard(pool, config, email_svc, id).await?;
        Self::get(pool, actor, id).await
    }

    pub async fn update(
        pool: &PgPool,
        config: &Config,
        email_svc: Option<Arc<EmailService>>,
        actor: &Actor,
        id: i64,
        req: &UpdateClinicRequest,
    ) -> AppResult<Clinic> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Clinic, Operation::Change, Some(&current.ownership()))?;
        if !actor.has_full_access() && req.touches_privileged_fields() {
            return Err(AppError::forbidden(
                "Only a superuser can change the administrator, license or internal fields",
            ));
        }
        if matches!(req.name.as_deref(), Some(n) if n.trim().is_empty()) {
            return Err(AppError::validation("Clinic name cannot be empty"));
        }
        if let Some(admin_id) = req.clinic_admin_id {
            Self::check_admin_candidate(pool, admin_id).await?;
        }

        sqlx::query(
            "UPDATE clinics
             SET name                = COALESCE($1, name),
                 address_line_1      = COALESCE($2, address_line_1),
                 address_line_2      = COALESCE($3, address_line_2),
                 city                = COALESCE($4, city),
                 country             = COALESCE($5, country),
                 contact_person_name = COALESCE($6, contact_person_name),
                 contact_role        = COALESCE($7, contact_role),
                 email               = COALESCE($8, email),
                 clinic_admin_id     = COALESCE($9, clinic_admin_id),
                 agreement_signed    = COALESCE($10, agreement_signed),
                 license_status      = COALESCE($11, license_status),
                 internal_notes      = COALESCE($12, internal_notes),
                 is_active           = COALESCE($13, is_active),
                 updated_at          = NOW()
             WHERE id = $14",
        )
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.address_line_1)
        .bind(&req.address_line_2)
        .bind(&req.city)
        .bind(&req.country)
        .bind(&req.contact_person_name)
        .bind(&req.contact_role)
        .bind(req.email.as_deref().map(str::trim))
        .bind(req.clinic_admin_id)
        .bind(req.agreement_signed)
        .bind(req.license_status.map(|s| s.as_str()))
        .bind(&req.internal_notes)
        .bind(req.is_active)
        .bind(id)
        .execute(pool)
        .await?;

        if actor.has_full_access() {
            Self::onboard(pool, config, email_svc, id).await?;
        }
        Self::get(pool, actor, id).await
    }

    pub async fn delete(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<()> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Clinic, Operation::Delete, Some(&current.ownership()))?;
        sqlx::query("DELETE FROM clinics WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        info!(clinic_id = id, user_id = actor.user_id, "clinic deleted");
        Ok(())
    }

    async fn check_admin_candidate(pool: &PgPool, user_id: i64) -> AppResult<()> {
        if !UserService::is_clinic_admin(pool, user_id).await? {
            return Err(AppError::validation(
                "The clinic administrator must be a user with the clinic admin role",
            ));
        }
        Ok(())
    }

    /// Provision and link a clinic admin from the contact person when the
    /// clinic has none. Provisioning failures are logged only.
    async fn onboard(
        pool: &PgPool,
        config: &Config,
        email_svc: Option<Arc<EmailService>>,
        id: i64,
    ) -> AppResult<()> {
        let Some(clinic) = Self::fetch(pool, id).await? else {
            return Ok(());
        };
        if !clinic.needs_admin() {
            return Ok(());
        }
        let (Some(contact), Some(email)) = (clinic.contact_person_name.as_deref(), clinic.email.as_deref()) else {
            return Ok(());
        };

        let (first_name, last_name) = split_contact_name(contact);
        let user_id = match IdentityService::provision_account(
            pool,
            config,
            email_svc,
            email,
            &first_name,
            &last_name,
            Role::ClinicAdmin,
            Some(id),
        )
        .await
        {
            Ok(Some(user_id)) => user_id,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(clinic_id = id, error = %e, "clinic admin provisioning failed");
                return Ok(());
            }
        };

        let linked = sqlx::query("UPDATE clinics SET clinic_admin_id = $1 WHERE id = $2 AND clinic_admin_id IS NULL")
            .bind(user_id)
            .bind(id)
            .execute(pool)
            .await;
        match linked {
            Ok(_) => info!(clinic_id = id, user_id, "clinic admin linked"),
            Err(e) => warn!(clinic_id = id, user_id, error = %e, "clinic admin could not be linked"),
        }
        Ok(())
    }
}
