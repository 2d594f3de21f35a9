use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use super::{
    child_display_name, AssignmentPlan, AssignmentStore, ClientRecord, CommittedAssignments,
    StoreError, StoreResult, TherapistRef,
};

#[derive(Clone)]
pub struct PgAssignmentStore {
    pool: PgPool,
}

impl PgAssignmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LockedClient {
    first_name: String,
    last_name: String,
    age: Option<i32>,
    clinic_id: Option<i64>,
    assigned_therapist_id: Option<i64>,
}

#[async_trait]
impl AssignmentStore for PgAssignmentStore {
    async fn therapist_by_email(&self, email: &str) -> StoreResult<Option<TherapistRef>> {
        if email.trim().is_empty() {
            return Ok(None);
        }
        let row: Option<(i64, Option<String>, Option<i64>)> = sqlx::query_as(
            "SELECT id, email, clinic_id FROM therapist_profiles
             WHERE LOWER(email) = LOWER($1)
             ORDER BY id LIMIT 1",
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, email, clinic_id)| TherapistRef { id, email, clinic_id }))
    }

    async fn client(&self, id: i64) -> StoreResult<Option<ClientRecord>> {
        let row: Option<(i64, String, String, Option<i32>, Option<i64>, Option<i64>, bool)> =
            sqlx::query_as(
                "SELECT p.id, p.first_name, p.last_name, p.age, p.clinic_id, p.assigned_therapist_id,
                        EXISTS(SELECT 1 FROM children ch WHERE ch.parent_id = p.id)
                 FROM parent_profiles p WHERE p.id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(
            |(id, first_name, last_name, age, clinic_id, assigned_therapist_id, has_child)| {
                ClientRecord {
                    id,
                    first_name,
                    last_name,
                    age,
                    clinic_id,
                    assigned_therapist_id,
                    has_child,
                }
            },
        ))
    }

    async fn active_task_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let found: Vec<i64> = sqlx::query_scalar(
            "SELECT id FROM tasks WHERE id = ANY($1) AND is_active = TRUE ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(found)
    }

    async fn commit_assignments(&self, plan: &AssignmentPlan) -> StoreResult<CommittedAssignments> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent batches for the same client so only one of
        // them can materialize the child.
        let client = sqlx::query_as::<_, LockedClient>(
            "SELECT first_name, last_name, age, clinic_id, assigned_therapist_id
             FROM parent_profiles WHERE id = $1 FOR UPDATE",
        )
        .bind(plan.client_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound("Client".into()))?;
        if client.assigned_therapist_id != plan.expected_assigned_therapist {
            return Err(StoreError::Conflict(
                "Client was reassigned to another therapist, please retry".into(),
            ));
        }

        let existing: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, name FROM children WHERE parent_id = $1 ORDER BY created_at, id LIMIT 1",
        )
        .bind(plan.client_id)
        .fetch_optional(&mut *tx)
        .await?;

        let (child_id, child_name, child_created) = match existing {
            Some((id, name)) => (id, name, false),
            None => {
                let clinic_id = client.clinic_id.ok_or_else(|| {
                    StoreError::Conflict("Client is not linked to a clinic".into())
                })?;
                let name = child_display_name(&client.first_name, &client.last_name);
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO children (name, age, gender, clinic_id, parent_id, assigned_therapist_id)
                     VALUES ($1, $2, 'other', $3, $4, $5)
                     RETURNING id",
                )
                .bind(&name)
                .bind(client.age.unwrap_or(plan.default_child_age))
                .bind(clinic_id)
                .bind(plan.client_id)
                .bind(client.assigned_therapist_id)
                .fetch_one(&mut *tx)
                .await?;
                debug!(child_id = id, client_id = plan.client_id, "child materialized");
                (id, name, true)
            }
        };

        let mut created = 0;
        for task_id in &plan.task_ids {
            let result = sqlx::query(
                "INSERT INTO assignments (child_id, therapist_id, task_id)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (child_id, task_id, therapist_id) DO NOTHING",
            )
            .bind(child_id)
            .bind(plan.therapist_id)
            .bind(task_id)
            .execute(&mut *tx)
            .await?;
            created += result.rows_affected();
        }

        tx.commit().await?;

        Ok(CommittedAssignments {
            child_id,
            child_name,
            child_created,
            created,
        })
    }
}
