//! In-memory assignment store for workflow tests.
//!
//! State lives behind one `tokio::sync::Mutex`, so a commit is atomic with
//! respect to every other call. `fail_after_inserts` simulates a store fault
//! mid-batch; the commit then leaves no trace. `reassign_before_commit`
//! lets a competing reassignment land between the workflow's reads and its
//! commit.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    child_display_name, AssignmentPlan, AssignmentStore, ClientRecord, CommittedAssignments,
    StoreError, StoreResult, TherapistRef,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemChild {
    pub id: i64,
    pub parent_id: i64,
    pub name: String,
    pub age: i32,
    pub gender: String,
    pub clinic_id: i64,
    pub therapist_id: Option<i64>,
}

#[derive(Debug, Default, Clone)]
struct State {
    therapists: Vec<TherapistRef>,
    clients: HashMap<i64, ClientRecord>,
    tasks: HashMap<i64, bool>,
    children: Vec<MemChild>,
    /// (child, task, therapist)
    assignments: BTreeSet<(i64, i64, i64)>,
    next_child_id: i64,
    fail_after_inserts: Option<usize>,
    /// (client, new responsible therapist)
    pending_reassignment: Option<(i64, Option<i64>)>,
}

#[derive(Debug, Default)]
pub struct MemoryAssignmentStore {
    state: Mutex<State>,
}

impl MemoryAssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_therapist(&self, id: i64, email: &str, clinic_id: Option<i64>) {
        self.state.lock().await.therapists.push(TherapistRef {
            id,
            email: Some(email.to_string()),
            clinic_id,
        });
    }

    /// `has_child` is derived from the stored children, whatever the record says.
    pub async fn add_client(&self, client: ClientRecord) {
        self.state.lock().await.clients.insert(client.id, client);
    }

    pub async fn add_task(&self, id: i64, active: bool) {
        self.state.lock().await.tasks.insert(id, active);
    }

    pub async fn add_child(&self, child: MemChild) {
        let mut state = self.state.lock().await;
        state.next_child_id = state.next_child_id.max(child.id);
        state.children.push(child);
    }

    pub async fn fail_after_inserts(&self, n: usize) {
        self.state.lock().await.fail_after_inserts = Some(n);
    }

    pub async fn reassign_before_commit(&self, client_id: i64, therapist_id: Option<i64>) {
        self.state.lock().await.pending_reassignment = Some((client_id, therapist_id));
    }

    pub async fn children(&self) -> Vec<MemChild> {
        self.state.lock().await.children.clone()
    }

    pub async fn assignments(&self) -> Vec<(i64, i64, i64)> {
        self.state.lock().await.assignments.iter().copied().collect()
    }
}

#[async_trait]
impl AssignmentStore for MemoryAssignmentStore {
    async fn therapist_by_email(&self, email: &str) -> StoreResult<Option<TherapistRef>> {
        let state = self.state.lock().await;
        Ok(state
            .therapists
            .iter()
            .find(|t| {
                !email.trim().is_empty()
                    && t.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email.trim()))
            })
            .cloned())
    }

    async fn client(&self, id: i64) -> StoreResult<Option<ClientRecord>> {
        let state = self.state.lock().await;
        Ok(state.clients.get(&id).cloned().map(|mut c| {
            c.has_child = state.children.iter().any(|ch| ch.parent_id == id);
            c
        }))
    }

    async fn active_task_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let state = self.state.lock().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| state.tasks.get(id).copied().unwrap_or(false))
            .collect())
    }

    async fn commit_assignments(&self, plan: &AssignmentPlan) -> StoreResult<CommittedAssignments> {
        let mut guard = self.state.lock().await;
        if let Some((client_id, therapist_id)) = guard.pending_reassignment.take() {
            if let Some(client) = guard.clients.get_mut(&client_id) {
                client.assigned_therapist_id = therapist_id;
            }
        }
        // Work on a copy and swap it in only on success.
        let mut state = guard.clone();

        let client = state
            .clients
            .get(&plan.client_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Client".into()))?;
        if client.assigned_therapist_id != plan.expected_assigned_therapist {
            return Err(StoreError::Conflict(
                "Client was reassigned to another therapist, please retry".into(),
            ));
        }

        let existing = state
            .children
            .iter()
            .filter(|ch| ch.parent_id == plan.client_id)
            .min_by_key(|ch| ch.id)
            .cloned();

        let (child_id, child_name, child_created) = match existing {
            Some(ch) => (ch.id, ch.name, false),
            None => {
                let clinic_id = client.clinic_id.ok_or_else(|| {
                    StoreError::Conflict("Client is not linked to a clinic".into())
                })?;
                state.next_child_id += 1;
                let child = MemChild {
                    id: state.next_child_id,
                    parent_id: client.id,
                    name: child_display_name(&client.first_name, &client.last_name),
                    age: client.age.unwrap_or(plan.default_child_age),
                    gender: "other".into(),
                    clinic_id,
                    therapist_id: client.assigned_therapist_id,
                };
                let out = (child.id, child.name.clone(), true);
                state.children.push(child);
                out
            }
        };

        let mut created = 0;
        for (n, task_id) in plan.task_ids.iter().enumerate() {
            if state.fail_after_inserts.is_some_and(|limit| n >= limit) {
                return Err(StoreError::Unexpected(anyhow::anyhow!("simulated store failure")));
            }
            if state.assignments.insert((child_id, *task_id, plan.therapist_id)) {
                created += 1;
            }
        }

        *guard = state;
        Ok(CommittedAssignments {
            child_id,
            child_name,
            child_created,
            created,
        })
    }
}
