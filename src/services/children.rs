use sqlx::PgPool;
use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::Actor,
        child::{Child, CreateChildRequest, Gender, UpdateChildRequest},
    },
    policy::{EntityKind, Operation, Ownership, PolicyEngine},
    services::{
        clients::ClientService, scoped_one, scoped_select, therapist_fits_clinic, therapists::TherapistService,
    },
};

const CHILD_SELECT: &str = "SELECT ch.*,
        NULLIF(TRIM(CONCAT(p.first_name, ' ', p.last_name)), '') AS parent_name,
        p.parent_email,
        NULLIF(TRIM(CONCAT(th.first_name, ' ', th.last_name)), '') AS therapist_name,
        th.email AS therapist_email,
        cl.name AS clinic_name
     FROM children ch
     JOIN parent_profiles p ON p.id = ch.parent_id
     LEFT JOIN therapist_profiles th ON th.id = ch.assigned_therapist_id
     LEFT JOIN clinics cl ON cl.id = ch.clinic_id";

pub struct ChildService;

impl ChildService {
    pub async fn list(pool: &PgPool, actor: &Actor) -> AppResult<Vec<Child>> {
        let mut qb = scoped_select(CHILD_SELECT, actor, EntityKind::Child);
        qb.push(" ORDER BY ch.name, ch.id");
        let children = qb.build_query_as::<Child>().fetch_all(pool).await?;
        Ok(children)
    }

    pub async fn list_for_parent(pool: &PgPool, actor: &Actor, parent_id: i64) -> AppResult<Vec<Child>> {
        let mut qb = scoped_select(CHILD_SELECT, actor, EntityKind::Child);
        qb.push(" AND ch.parent_id = ").push_bind(parent_id);
        qb.push(" ORDER BY ch.created_at, ch.id");
        let children = qb.build_query_as::<Child>().fetch_all(pool).await?;
        Ok(children)
    }

    /// Children of the calling parent, matched through the client email.
    pub async fn for_parent(pool: &PgPool, actor: &Actor) -> AppResult<Vec<Child>> {
        if !actor.is_parent() {
            return Err(AppError::forbidden("Only parents can view their children here"));
        }
        let has_profile: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM parent_profiles WHERE LOWER(parent_email) = LOWER($1))",
        )
        .bind(&actor.email)
        .fetch_one(pool)
        .await?;
        if !has_profile {
            return Err(AppError::ProfileNotFound("Parent profile not found.".into()));
        }
        Self::list(pool, actor).await
    }

    pub async fn find(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<Option<Child>> {
        scoped_one(pool, actor, EntityKind::Child, CHILD_SELECT, id).await
    }

    pub async fn get(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<Child> {
        Self::find(pool, actor, id)
            .await?
            .ok_or_else(|| AppError::not_found("Child not found"))
    }

    pub async fn create(pool: &PgPool, actor: &Actor, req: &CreateChildRequest) -> AppResult<Child> {
        if req.name.trim().is_empty() {
            return Err(AppError::validation("Name is required"));
        }
        if req.age < 0 {
            return Err(AppError::validation("Age cannot be negative"));
        }

        let parent = ClientService::find(pool, actor, req.parent_id)
            .await?
            .ok_or_else(|| AppError::validation("Select a valid parent."))?;
        let clinic_id = parent
            .clinic_id
            .ok_or_else(|| AppError::validation("The parent is not linked to a clinic."))?;

        // Inherit the parent's therapist unless one is given explicitly.
        let therapist = match req.assigned_therapist_id.or(parent.assigned_therapist_id) {
            Some(tid) => Some(
                TherapistService::find(pool, actor, tid)
                    .await?
                    .ok_or_else(|| AppError::validation("Select a valid therapist."))?,
            ),
            None => None,
        };
        if let Some(t) = &therapist {
            if !therapist_fits_clinic(Some(clinic_id), t.clinic_id) {
                return Err(AppError::validation("The therapist belongs to another clinic."));
            }
        }

        PolicyEngine::authorize(
            actor,
            EntityKind::Child,
            Operation::Add,
            Some(&Ownership {
                clinic_id: Some(clinic_id),
                therapist_email: therapist.as_ref().and_then(|t| t.email.clone()),
                parent_email: parent.parent_email.clone(),
                ..Ownership::default()
            }),
        )?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO children (name, age, gender, clinic_id, parent_id, assigned_therapist_id)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(req.name.trim())
        .bind(req.age)
        .bind(req.gender.unwrap_or(Gender::Other).as_str())
        .bind(clinic_id)
        .bind(parent.id)
        .bind(therapist.as_ref().map(|t| t.id))
        .fetch_one(pool)
        .await?;
        info!(child_id = id, client_id = parent.id, user_id = actor.user_id, "child created");

        Self::get(pool, actor, id).await
    }

    pub async fn update(pool: &PgPool, actor: &Actor, id: i64, req: &UpdateChildRequest) -> AppResult<Child> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Child, Operation::Change, Some(&current.ownership()))?;
        if matches!(req.name.as_deref(), Some(n) if n.trim().is_empty()) {
            return Err(AppError::validation("Name cannot be empty"));
        }
        if matches!(req.age, Some(a) if a < 0) {
            return Err(AppError::validation("Age cannot be negative"));
        }
        if let Some(tid) = req.assigned_therapist_id {
            if actor.is_therapist() {
                return Err(AppError::forbidden("Therapists cannot reassign a child"));
            }
            let therapist = TherapistService::find(pool, actor, tid)
                .await?
                .ok_or_else(|| AppError::validation("Select a valid therapist."))?;
            if !therapist_fits_clinic(Some(current.clinic_id), therapist.clinic_id) {
                return Err(AppError::validation("The therapist belongs to another clinic."));
            }
        }

        sqlx::query(
            "UPDATE children
             SET name                  = COALESCE($1, name),
                 age                   = COALESCE($2, age),
                 gender                = COALESCE($3, gender),
                 assigned_therapist_id = COALESCE($4, assigned_therapist_id)
             WHERE id = $5",
        )
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.age)
        .bind(req.gender.map(|g| g.as_str()))
        .bind(req.assigned_therapist_id)
        .bind(id)
        .execute(pool)
        .await?;

        Self::get(pool, actor, id).await
    }

    pub async fn delete(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<()> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Child, Operation::Delete, Some(&current.ownership()))?;
        sqlx::query("DELETE FROM children WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        info!(child_id = id, user_id = actor.user_id, "child deleted");
        Ok(())
    }
}
