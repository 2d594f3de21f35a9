//! Persistence seam of the assignment workflow.
//!
//! The workflow only needs a handful of lookups and one atomic commit, so it
//! talks to this trait instead of the pool. Postgres backs it in production;
//! tests use the in-memory implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::{integrity_violation, AppError};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match integrity_violation(&err) {
            Some(msg) => StoreError::Conflict(msg),
            None => StoreError::Unexpected(err.into()),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(format!("{what} not found")),
            StoreError::Conflict(msg) => AppError::Integrity(msg),
            StoreError::Unexpected(e) => AppError::Internal(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TherapistRef {
    pub id: i64,
    pub email: Option<String>,
    pub clinic_id: Option<i64>,
}

/// The slice of a client the workflow decides on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRecord {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<i32>,
    pub clinic_id: Option<i64>,
    pub assigned_therapist_id: Option<i64>,
    pub has_child: bool,
}

#[derive(Debug, Clone)]
pub struct AssignmentPlan {
    pub client_id: i64,
    pub therapist_id: i64,
    /// The client's responsible therapist when ownership was checked. The
    /// commit refuses to proceed if the locked row says otherwise.
    pub expected_assigned_therapist: Option<i64>,
    /// Distinct, validated task ids.
    pub task_ids: Vec<i64>,
    pub default_child_age: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedAssignments {
    pub child_id: i64,
    pub child_name: String,
    pub child_created: bool,
    pub created: u64,
}

/// Display name given to a child created from its client.
pub fn child_display_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", first_name.trim(), last_name.trim()).trim().to_string()
}

#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Case-insensitive lookup of the therapist profile carrying this email.
    async fn therapist_by_email(&self, email: &str) -> StoreResult<Option<TherapistRef>>;

    async fn client(&self, id: i64) -> StoreResult<Option<ClientRecord>>;

    /// The subset of `ids` that reference existing, active tasks.
    async fn active_task_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>>;

    /// Atomically ensure the client has a child and create the missing
    /// (child, task, therapist) assignments. Either everything persists or
    /// nothing does.
    async fn commit_assignments(&self, plan: &AssignmentPlan) -> StoreResult<CommittedAssignments>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_name_joins_first_and_last() {
        assert_eq!(child_display_name("Ann", "Lee"), "Ann Lee");
        assert_eq!(child_display_name(" Ann ", ""), "Ann");
    }

    #[test]
    fn store_errors_map_onto_app_errors() {
        let err: AppError = StoreError::NotFound("Client".into()).into();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Client not found"));
        let err: AppError = StoreError::Conflict("dup".into()).into();
        assert!(matches!(err, AppError::Integrity(_)));
    }

    #[derive(Debug)]
    struct PgViolation(&'static str);

    impl std::fmt::Display for PgViolation {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "violation {}", self.0)
        }
    }

    impl std::error::Error for PgViolation {}

    impl sqlx::error::DatabaseError for PgViolation {
        fn message(&self) -> &str {
            "violates constraint"
        }

        fn code(&self) -> Option<std::borrow::Cow<'_, str>> {
            Some(std::borrow::Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> sqlx::error::ErrorKind {
            match self.0 {
                "23505" => sqlx::error::ErrorKind::UniqueViolation,
                "23503" => sqlx::error::ErrorKind::ForeignKeyViolation,
                _ => sqlx::error::ErrorKind::Other,
            }
        }
    }

    fn db_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(PgViolation(code)))
    }

    #[test]
    fn constraint_violations_inside_the_commit_surface_as_integrity() {
        for code in ["23503", "23505"] {
            let err = AppError::from(StoreError::from(db_error(code)));
            assert!(matches!(err, AppError::Integrity(ref m) if m == "violates constraint"), "{code}");
        }
        let err = AppError::from(StoreError::from(db_error("40001")));
        assert!(matches!(err, AppError::Internal(_)));
    }
}
