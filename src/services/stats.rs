use serde::Serialize;
use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::auth::Actor,
    policy::EntityKind,
    services::scoped_select,
};

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub role: &'static str,
    pub clinics: i64,
    pub therapists: i64,
    pub clients: i64,
    pub children: i64,
    pub assignments: i64,
    pub completed_assignments: i64,
    pub active_tasks: i64,
}

const COUNT_CLINICS: &str = "SELECT COUNT(*) FROM clinics c";
const COUNT_THERAPISTS: &str = "SELECT COUNT(*) FROM therapist_profiles t";
const COUNT_CLIENTS: &str = "SELECT COUNT(*) FROM parent_profiles p
     LEFT JOIN therapist_profiles th ON th.id = p.assigned_therapist_id";
const COUNT_CHILDREN: &str = "SELECT COUNT(*) FROM children ch
     JOIN parent_profiles p ON p.id = ch.parent_id
     LEFT JOIN therapist_profiles th ON th.id = ch.assigned_therapist_id";
const COUNT_ASSIGNMENTS: &str = "SELECT COUNT(*) FROM assignments a
     JOIN children ch ON ch.id = a.child_id
     JOIN parent_profiles p ON p.id = ch.parent_id
     JOIN therapist_profiles th ON th.id = a.therapist_id";

pub struct StatsService;

impl StatsService {
    /// Counts of everything the actor can see, so each role gets its own dashboard.
    pub async fn dashboard(pool: &PgPool, actor: &Actor) -> AppResult<DashboardStats> {
        let completed = {
            let mut qb = scoped_select(COUNT_ASSIGNMENTS, actor, EntityKind::Assignment);
            qb.push(" AND a.completed = TRUE");
            qb.build_query_scalar::<i64>().fetch_one(pool).await?
        };
        let active_tasks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE is_active = TRUE")
            .fetch_one(pool)
            .await?;

        Ok(DashboardStats {
            role: if actor.has_full_access() { "superuser" } else { actor.role.label() },
            clinics: count(pool, actor, EntityKind::Clinic, COUNT_CLINICS).await?,
            therapists: count(pool, actor, EntityKind::Therapist, COUNT_THERAPISTS).await?,
            clients: count(pool, actor, EntityKind::Client, COUNT_CLIENTS).await?,
            children: count(pool, actor, EntityKind::Child, COUNT_CHILDREN).await?,
            assignments: count(pool, actor, EntityKind::Assignment, COUNT_ASSIGNMENTS).await?,
            completed_assignments: completed,
            active_tasks,
        })
    }
}

async fn count(pool: &PgPool, actor: &Actor, kind: EntityKind, select: &str) -> AppResult<i64> {
    let n = scoped_select(select, actor, kind)
        .build_query_scalar::<i64>()
        .fetch_one(pool)
        .await?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::ActorRole;

    #[test]
    fn parent_counts_are_scoped_to_their_email() {
        let actor = Actor {
            user_id: 2,
            email: "parent@x.test".into(),
            is_superuser: false,
            role: ActorRole::Parent,
        };
        let qb = scoped_select(COUNT_CHILDREN, &actor, EntityKind::Child);
        assert!(qb.sql().ends_with("WHERE (LOWER(p.parent_email) = $1)"));
        let qb = scoped_select(COUNT_CLINICS, &actor, EntityKind::Clinic);
        assert!(qb.sql().ends_with("WHERE FALSE"));
    }
}
