pub mod assignment_workflow;
pub mod assignments;
pub mod auth;
pub mod children;
pub mod clients;
pub mod clinics;
pub mod email;
pub mod identity;
pub mod metrics;
pub mod stats;
pub mod taxonomy;
pub mod therapists;
pub mod users;
pub mod wizard;

use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, QueryBuilder};

use crate::{
    error::AppResult,
    models::auth::Actor,
    policy::{EntityKind, PolicyEngine},
};

/// Start a list query restricted to the rows `actor` may see.
/// Callers append further conditions with `AND`.
pub(crate) fn scoped_select<'a>(select: &str, actor: &Actor, kind: EntityKind) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("{select} WHERE "));
    PolicyEngine::scope(actor, kind).push_filter(&mut qb, &kind.columns());
    qb
}

/// Load one row by id, but only if `actor` may open it individually.
pub(crate) async fn scoped_one<T>(
    pool: &PgPool,
    actor: &Actor,
    kind: EntityKind,
    select: &str,
    id: i64,
) -> AppResult<Option<T>>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let row = scoped_one_query(actor, kind, select, id)
        .build_query_as::<T>()
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

fn scoped_one_query<'a>(actor: &Actor, kind: EntityKind, select: &str, id: i64) -> QueryBuilder<'a, Postgres> {
    let cols = kind.columns();
    let mut qb = QueryBuilder::new(format!("{select} WHERE "));
    PolicyEngine::instance_scope(actor, kind).push_filter(&mut qb, &cols);
    qb.push(format!(" AND {} = ", cols.id.unwrap_or("id")));
    qb.push_bind(id);
    qb
}

/// A referenced therapist may only serve a row of their own clinic. Rows or
/// therapists without a clinic are not constrained.
pub(crate) fn therapist_fits_clinic(row_clinic: Option<i64>, therapist_clinic: Option<i64>) -> bool {
    match (row_clinic, therapist_clinic) {
        (Some(row), Some(therapist)) => row == therapist,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::ActorRole;

    #[test]
    fn scoped_select_prefixes_the_scope_predicate() {
        let actor = Actor {
            user_id: 1,
            email: "p@x".into(),
            is_superuser: false,
            role: ActorRole::Parent,
        };
        let qb = scoped_select("SELECT p.* FROM parent_profiles p", &actor, EntityKind::Client);
        assert_eq!(
            qb.sql(),
            "SELECT p.* FROM parent_profiles p WHERE (LOWER(p.parent_email) = $1)"
        );
    }

    #[test]
    fn clinic_admin_assignment_list_is_empty_by_construction() {
        let actor = Actor {
            user_id: 1,
            email: "a@x".into(),
            is_superuser: false,
            role: ActorRole::ClinicAdmin { clinic_id: Some(2) },
        };
        let qb = scoped_select("SELECT a.* FROM assignments a", &actor, EntityKind::Assignment);
        assert_eq!(qb.sql(), "SELECT a.* FROM assignments a WHERE FALSE");
    }

    const THERAPIST_SELECT: &str = "SELECT t.* FROM therapist_profiles t";

    #[test]
    fn clinic_admin_therapist_lookup_is_pinned_to_their_clinic() {
        let actor = Actor {
            user_id: 1,
            email: "a@x".into(),
            is_superuser: false,
            role: ActorRole::ClinicAdmin { clinic_id: Some(2) },
        };
        let qb = scoped_one_query(&actor, EntityKind::Therapist, THERAPIST_SELECT, 9);
        assert_eq!(
            qb.sql(),
            "SELECT t.* FROM therapist_profiles t WHERE (t.clinic_id = $1) AND t.id = $2"
        );
    }

    #[test]
    fn therapist_can_only_look_up_their_own_profile() {
        let actor = Actor {
            user_id: 3,
            email: "T@x".into(),
            is_superuser: false,
            role: ActorRole::Therapist,
        };
        let qb = scoped_one_query(&actor, EntityKind::Therapist, THERAPIST_SELECT, 9);
        assert_eq!(
            qb.sql(),
            "SELECT t.* FROM therapist_profiles t WHERE (LOWER(t.email) = $1) AND t.id = $2"
        );
    }

    #[test]
    fn therapist_from_another_clinic_does_not_fit() {
        assert!(therapist_fits_clinic(Some(1), Some(1)));
        assert!(!therapist_fits_clinic(Some(1), Some(2)));
        assert!(therapist_fits_clinic(None, Some(2)));
        assert!(therapist_fits_clinic(Some(1), None));
    }
}
