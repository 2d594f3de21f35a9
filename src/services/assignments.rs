use sqlx::PgPool;
use tracing::info;

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        assignment::{
            AssignTasksRequest, AssignTasksResult, Assignment, AssignmentFilter, CreateAssignmentRequest,
            UpdateAssignmentRequest,
        },
        auth::Actor,
        taxonomy::Difficulty,
    },
    policy::{EntityKind, Operation, Ownership, PolicyEngine},
    services::{
        assignment_workflow::AssignmentWorkflow, children::ChildService, metrics, scoped_one, scoped_select,
        therapist_fits_clinic, therapists::TherapistService,
    },
    store::postgres::PgAssignmentStore,
};

const ASSIGNMENT_SELECT: &str = "SELECT a.id, a.child_id, ch.name AS child_name,
        NULLIF(TRIM(CONCAT(p.first_name, ' ', p.last_name)), '') AS parent_name,
        p.parent_email, ch.clinic_id AS clinic_id,
        a.therapist_id,
        NULLIF(TRIM(CONCAT(th.first_name, ' ', th.last_name)), '') AS therapist_name,
        th.email AS therapist_email,
        a.task_id, tk.title AS task_title, tk.difficulty AS task_difficulty,
        sa.name AS speech_area_name,
        a.assigned_date, a.due_date, a.completed, a.notes
     FROM assignments a
     JOIN children ch ON ch.id = a.child_id
     JOIN parent_profiles p ON p.id = ch.parent_id
     JOIN therapist_profiles th ON th.id = a.therapist_id
     JOIN tasks tk ON tk.id = a.task_id
     LEFT JOIN short_term_goals stg ON stg.id = tk.short_term_goal_id
     LEFT JOIN long_term_goals ltg ON ltg.id = stg.long_term_goal_id
     LEFT JOIN speech_areas sa ON sa.id = ltg.speech_area_id";

pub struct AssignmentService;

impl AssignmentService {
    pub async fn list(pool: &PgPool, actor: &Actor, filter: &AssignmentFilter) -> AppResult<Vec<Assignment>> {
        let mut qb = scoped_select(ASSIGNMENT_SELECT, actor, EntityKind::Assignment);
        if let Some(completed) = filter.completed {
            qb.push(" AND a.completed = ").push_bind(completed);
        }
        if let Some(therapist_id) = filter.therapist_id {
            qb.push(" AND a.therapist_id = ").push_bind(therapist_id);
        }
        if let Some(child_id) = filter.child_id {
            qb.push(" AND a.child_id = ").push_bind(child_id);
        }
        if let Some(parent_id) = filter.parent_id {
            qb.push(" AND ch.parent_id = ").push_bind(parent_id);
        }
        if let Some(raw) = filter.difficulty.as_deref().filter(|d| !d.trim().is_empty()) {
            let difficulty: Difficulty = raw.parse().map_err(AppError::Validation)?;
            qb.push(" AND tk.difficulty = ").push_bind(difficulty.as_str());
        }
        if let Some(area) = filter.speech_area.as_deref().filter(|s| !s.trim().is_empty()) {
            qb.push(" AND sa.name ILIKE ").push_bind(format!("%{}%", area.trim()));
        }
        if let Some(after) = filter.assigned_after {
            qb.push(" AND a.assigned_date::date >= ").push_bind(after);
        }
        if let Some(before) = filter.assigned_before {
            qb.push(" AND a.assigned_date::date <= ").push_bind(before);
        }
        if let Some(after) = filter.due_after {
            qb.push(" AND a.due_date >= ").push_bind(after);
        }
        if let Some(before) = filter.due_before {
            qb.push(" AND a.due_date <= ").push_bind(before);
        }
        qb.push(" ORDER BY a.assigned_date DESC, a.id DESC");
        let rows = qb.build_query_as::<Assignment>().fetch_all(pool).await?;
        Ok(rows)
    }

    pub async fn get(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<Assignment> {
        scoped_one(pool, actor, EntityKind::Assignment, ASSIGNMENT_SELECT, id)
            .await?
            .ok_or_else(|| AppError::not_found("Assignment not found"))
    }

    /// Assign one task to one child.
    ///
    /// The therapist defaults to the caller's own profile; the child and task
    /// must both be visible to the caller.
    pub async fn create(pool: &PgPool, actor: &Actor, req: &CreateAssignmentRequest) -> AppResult<Assignment> {
        let therapist = match req.therapist_id {
            Some(tid) => TherapistService::find(pool, actor, tid)
                .await?
                .ok_or_else(|| AppError::validation("Select a valid therapist."))?,
            None => TherapistService::own_profile(pool, actor).await?,
        };
        let child = ChildService::find(pool, actor, req.child_id)
            .await?
            .ok_or_else(|| AppError::validation("Select a valid child."))?;
        let task_active: Option<bool> = sqlx::query_scalar("SELECT is_active FROM tasks WHERE id = $1")
            .bind(req.task_id)
            .fetch_optional(pool)
            .await?;
        if !therapist_fits_clinic(Some(child.clinic_id), therapist.clinic_id) {
            return Err(AppError::validation("The therapist belongs to another clinic."));
        }
        if task_active != Some(true) {
            return Err(AppError::validation("Select a valid, active task."));
        }

        PolicyEngine::authorize(
            actor,
            EntityKind::Assignment,
            Operation::Add,
            Some(&Ownership {
                clinic_id: Some(child.clinic_id),
                therapist_email: therapist.email.clone(),
                parent_email: child.parent_email.clone(),
                ..Ownership::default()
            }),
        )?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO assignments (child_id, therapist_id, task_id, due_date, completed, notes)
             VALUES ($1, $2, $3, $4, COALESCE($5, FALSE), $6)
             RETURNING id",
        )
        .bind(child.id)
        .bind(therapist.id)
        .bind(req.task_id)
        .bind(req.due_date)
        .bind(req.completed)
        .bind(&req.notes)
        .fetch_one(pool)
        .await?;
        metrics::ASSIGNMENTS_CREATED.inc();
        info!(assignment_id = id, child_id = child.id, user_id = actor.user_id, "assignment created");

        Self::get(pool, actor, id).await
    }

    pub async fn update(
        pool: &PgPool,
        actor: &Actor,
        id: i64,
        req: &UpdateAssignmentRequest,
    ) -> AppResult<Assignment> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Assignment, Operation::Change, Some(&current.ownership()))?;
        sqlx::query(
            "UPDATE assignments
             SET due_date  = COALESCE($1, due_date),
                 completed = COALESCE($2, completed),
                 notes     = COALESCE($3, notes)
             WHERE id = $4",
        )
        .bind(req.due_date)
        .bind(req.completed)
        .bind(&req.notes)
        .bind(id)
        .execute(pool)
        .await?;
        Self::get(pool, actor, id).await
    }

    pub async fn delete(pool: &PgPool, actor: &Actor, id: i64) -> AppResult<()> {
        let current = Self::get(pool, actor, id).await?;
        PolicyEngine::authorize(actor, EntityKind::Assignment, Operation::Delete, Some(&current.ownership()))?;
        sqlx::query("DELETE FROM assignments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        info!(assignment_id = id, user_id = actor.user_id, "assignment deleted");
        Ok(())
    }

    /// Batch entry point shared by the REST endpoint and the wizard.
    pub async fn assign_tasks(
        pool: &PgPool,
        config: &Config,
        actor: &Actor,
        req: &AssignTasksRequest,
    ) -> AppResult<AssignTasksResult> {
        let store = PgAssignmentStore::new(pool.clone());
        AssignmentWorkflow::assign_tasks(&store, actor, req.parent_id, &req.selected_tasks, config.default_child_age)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::ActorRole;

    #[test]
    fn therapist_assignment_list_filters_on_the_responsible_therapist() {
        let actor = Actor {
            user_id: 4,
            email: "T@Clinic.test".into(),
            is_superuser: false,
            role: ActorRole::Therapist,
        };
        let qb = scoped_select(ASSIGNMENT_SELECT, &actor, EntityKind::Assignment);
        assert!(qb.sql().ends_with("WHERE (LOWER(th.email) = $1)"));
    }
}
