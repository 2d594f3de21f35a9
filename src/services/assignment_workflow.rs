//! Batch assignment of tasks to a client's child.
//!
//! Shared by `POST /assign-tasks` and the wizard. The order of checks is
//! fixed: input, role, therapist profile, client, ownership, tasks, commit.

use std::collections::HashSet;

use tracing::info;

use crate::{
    error::{AppError, AppResult},
    models::{assignment::AssignTasksResult, auth::Actor},
    services::metrics,
    store::{AssignmentPlan, AssignmentStore},
};

pub struct AssignmentWorkflow;

impl AssignmentWorkflow {
    pub async fn assign_tasks<S: AssignmentStore + ?Sized>(
        store: &S,
        actor: &Actor,
        client_id: i64,
        task_ids: &[i64],
        default_child_age: i32,
    ) -> AppResult<AssignTasksResult> {
        let task_ids = dedup(task_ids);
        if task_ids.is_empty() {
            return Err(AppError::validation("At least one task must be selected."));
        }

        let full_access = actor.has_full_access();
        if !full_access && !actor.is_therapist() {
            return Err(AppError::forbidden(
                "Only therapists can assign tasks to clients.",
            ));
        }

        let own_profile = store.therapist_by_email(&actor.email).await?;
        if !full_access && own_profile.is_none() {
            return Err(AppError::ProfileNotFound(
                "Therapist profile not found.".into(),
            ));
        }

        let client = store
            .client(client_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client not found."))?;

        let therapist_id = match (&own_profile, full_access) {
            (Some(profile), false) => {
                if client.assigned_therapist_id != Some(profile.id) {
                    return Err(AppError::forbidden(
                        "You can only assign tasks to your own clients.",
                    ));
                }
                profile.id
            }
            (Some(profile), true) => profile.id,
            (None, _) => client.assigned_therapist_id.ok_or_else(|| {
                AppError::ProfileNotFound(
                    "No therapist profile available for this assignment.".into(),
                )
            })?,
        };

        let active = store.active_task_ids(&task_ids).await?;
        if active.len() != task_ids.len() {
            return Err(AppError::validation(
                "One or more tasks not found or inactive.",
            ));
        }

        if !client.has_child && client.clinic_id.is_none() {
            return Err(AppError::validation("Client is not linked to a clinic."));
        }

        let committed = store
            .commit_assignments(&AssignmentPlan {
                client_id: client.id,
                therapist_id,
                expected_assigned_therapist: client.assigned_therapist_id,
                task_ids,
                default_child_age,
            })
            .await?;

        metrics::ASSIGNMENTS_CREATED.inc_by(committed.created as f64);
        if committed.child_created {
            metrics::CHILDREN_MATERIALIZED.inc();
        }
        info!(
            user_id = actor.user_id,
            client_id = client.id,
            child_id = committed.child_id,
            therapist_id,
            created = committed.created,
            child_created = committed.child_created,
            "tasks assigned"
        );

        let message = if committed.created == 0 {
            format!("All selected tasks were already assigned to {}.", committed.child_name)
        } else {
            format!(
                "Successfully assigned {} task(s) to {}.",
                committed.created, committed.child_name
            )
        };

        Ok(AssignTasksResult {
            success: true,
            message,
            child_name: committed.child_name,
            assignments_created: committed.created,
            child_created: committed.child_created,
        })
    }
}

/// Distinct ids in first-seen order.
fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::auth::ActorRole,
        store::{memory::MemChild, memory::MemoryAssignmentStore, ClientRecord},
    };

    const CLINIC: i64 = 1;
    const T: i64 = 100;
    const OTHER_T: i64 = 101;
    const ANN: i64 = 500;

    fn therapist(email: &str) -> Actor {
        Actor {
            user_id: 7,
            email: email.into(),
            is_superuser: false,
            role: ActorRole::Therapist,
        }
    }

    fn superuser() -> Actor {
        Actor {
            user_id: 1,
            email: "root@clinic.test".into(),
            is_superuser: true,
            role: ActorRole::Unassigned,
        }
    }

    fn ann(age: Option<i32>) -> ClientRecord {
        ClientRecord {
            id: ANN,
            first_name: "Ann".into(),
            last_name: "Lee".into(),
            age,
            clinic_id: Some(CLINIC),
            assigned_therapist_id: Some(T),
            has_child: false,
        }
    }

    async fn seeded(age: Option<i32>) -> MemoryAssignmentStore {
        let store = MemoryAssignmentStore::new();
        store.add_therapist(T, "t@x", Some(CLINIC)).await;
        store.add_therapist(OTHER_T, "other@x", Some(CLINIC)).await;
        store.add_client(ann(age)).await;
        store.add_task(1, true).await;
        store.add_task(2, true).await;
        store.add_task(3, false).await;
        store
    }

    #[tokio::test]
    async fn assigned_therapist_creates_child_and_assignments() {
        let store = seeded(Some(7)).await;
        let out = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[1, 2], 5)
            .await
            .unwrap();

        assert!(out.success);
        assert_eq!(out.assignments_created, 2);
        assert_eq!(out.child_name, "Ann Lee");
        assert!(out.child_created);

        let children = store.children().await;
        assert_eq!(children.len(), 1);
        let child = &children[0];
        assert_eq!(child.age, 7);
        assert_eq!(child.gender, "other");
        assert_eq!(child.clinic_id, CLINIC);
        assert_eq!(child.therapist_id, Some(T));
        assert_eq!(
            store.assignments().await,
            vec![(child.id, 1, T), (child.id, 2, T)]
        );
    }

    #[tokio::test]
    async fn second_identical_call_creates_nothing() {
        let store = seeded(Some(7)).await;
        let actor = therapist("T@X");
        let first = AssignmentWorkflow::assign_tasks(&store, &actor, ANN, &[1], 5).await.unwrap();
        let second = AssignmentWorkflow::assign_tasks(&store, &actor, ANN, &[1], 5).await.unwrap();

        assert_eq!(first.assignments_created, 1);
        assert_eq!(second.assignments_created, 0);
        assert!(!second.child_created);
        assert_eq!(store.assignments().await.len(), 1);
        assert_eq!(store.children().await.len(), 1);
    }

    #[tokio::test]
    async fn child_age_falls_back_to_default() {
        let store = seeded(None).await;
        AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[1], 5)
            .await
            .unwrap();
        assert_eq!(store.children().await[0].age, 5);
    }

    #[tokio::test]
    async fn existing_child_is_reused() {
        let store = seeded(Some(7)).await;
        store
            .add_child(MemChild {
                id: 40,
                parent_id: ANN,
                name: "Annie".into(),
                age: 6,
                gender: "female".into(),
                clinic_id: CLINIC,
                therapist_id: Some(T),
            })
            .await;
        let out = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[2], 5)
            .await
            .unwrap();
        assert_eq!(out.child_name, "Annie");
        assert!(!out.child_created);
        assert_eq!(store.assignments().await, vec![(40, 2, T)]);
    }

    #[tokio::test]
    async fn other_therapist_is_refused_and_writes_nothing() {
        let store = seeded(Some(7)).await;
        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("other@x"), ANN, &[1, 2], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(store.assignments().await.is_empty());
        assert!(store.children().await.is_empty());
    }

    #[tokio::test]
    async fn superuser_assigns_regardless_of_ownership() {
        let store = seeded(Some(7)).await;
        let out = AssignmentWorkflow::assign_tasks(&store, &superuser(), ANN, &[1], 5)
            .await
            .unwrap();
        assert_eq!(out.assignments_created, 1);
        let child_id = store.children().await[0].id;
        assert_eq!(store.assignments().await, vec![(child_id, 1, T)]);
    }

    #[tokio::test]
    async fn superuser_with_own_profile_assigns_as_themself() {
        let store = seeded(Some(7)).await;
        store.add_therapist(102, "root@clinic.test", None).await;
        AssignmentWorkflow::assign_tasks(&store, &superuser(), ANN, &[1], 5)
            .await
            .unwrap();
        let child_id = store.children().await[0].id;
        assert_eq!(store.assignments().await, vec![(child_id, 1, 102)]);
    }

    #[tokio::test]
    async fn superuser_without_any_therapist_gets_profile_not_found() {
        let store = seeded(Some(7)).await;
        store
            .add_client(ClientRecord {
                assigned_therapist_id: None,
                ..ann(Some(7))
            })
            .await;
        let err = AssignmentWorkflow::assign_tasks(&store, &superuser(), ANN, &[1], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn inactive_task_rejects_the_whole_batch() {
        let store = seeded(Some(7)).await;
        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[1, 3], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[1, 99], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.assignments().await.is_empty());
        assert!(store.children().await.is_empty());
    }

    #[tokio::test]
    async fn duplicate_ids_in_one_request_count_once() {
        let store = seeded(Some(7)).await;
        let out = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[1, 1, 2, 1], 5)
            .await
            .unwrap();
        assert_eq!(out.assignments_created, 2);
    }

    #[tokio::test]
    async fn empty_batch_is_a_validation_error() {
        let store = seeded(Some(7)).await;
        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn non_therapist_roles_are_forbidden() {
        let store = seeded(Some(7)).await;
        for role in [
            ActorRole::ClinicAdmin { clinic_id: Some(CLINIC) },
            ActorRole::Parent,
            ActorRole::Unassigned,
        ] {
            let actor = Actor {
                role,
                ..therapist("t@x")
            };
            let err = AssignmentWorkflow::assign_tasks(&store, &actor, ANN, &[1], 5)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Forbidden(_)), "{role:?}");
        }
        assert!(store.assignments().await.is_empty());
    }

    #[tokio::test]
    async fn therapist_without_profile_gets_profile_not_found() {
        let store = seeded(Some(7)).await;
        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("ghost@x"), ANN, &[1], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProfileNotFound(_)));
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let store = seeded(Some(7)).await;
        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), 999, &[1], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn failure_mid_batch_leaves_no_rows() {
        let store = seeded(None).await;
        store.fail_after_inserts(1).await;
        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[1, 2], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert!(store.assignments().await.is_empty());
        assert!(store.children().await.is_empty());
    }

    #[tokio::test]
    async fn reassignment_before_commit_is_a_conflict() {
        let store = seeded(Some(7)).await;
        store.reassign_before_commit(ANN, Some(OTHER_T)).await;
        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[1, 2], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
        assert!(store.assignments().await.is_empty());
        assert!(store.children().await.is_empty());

        // The new owner goes through on the refreshed row.
        AssignmentWorkflow::assign_tasks(&store, &therapist("other@x"), ANN, &[1], 5)
            .await
            .unwrap();
        assert_eq!(store.assignments().await.len(), 1);
    }

    #[tokio::test]
    async fn client_without_clinic_cannot_get_a_child() {
        let store = seeded(Some(7)).await;
        store
            .add_client(ClientRecord {
                clinic_id: None,
                ..ann(Some(7))
            })
            .await;
        let err = AssignmentWorkflow::assign_tasks(&store, &therapist("t@x"), ANN, &[1], 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
