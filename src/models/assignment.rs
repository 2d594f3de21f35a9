use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::policy::Ownership;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Assignment {
    pub id: i64,
    pub child_id: i64,
    pub child_name: Option<String>,
    pub parent_name: Option<String>,
    #[serde(skip_serializing)]
    pub parent_email: Option<String>,
    #[serde(skip_serializing)]
    pub clinic_id: Option<i64>,
    pub therapist_id: i64,
    pub therapist_name: Option<String>,
    #[serde(skip_serializing)]
    pub therapist_email: Option<String>,
    pub task_id: i64,
    pub task_title: Option<String>,
    pub task_difficulty: Option<String>,
    pub speech_area_name: Option<String>,
    pub assigned_date: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub notes: Option<String>,
}

impl Assignment {
    pub fn ownership(&self) -> Ownership {
        Ownership {
            id: Some(self.id),
            clinic_id: self.clinic_id,
            therapist_email: self.therapist_email.clone(),
            parent_email: self.parent_email.clone(),
            ..Ownership::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateAssignmentRequest {
    pub child_id: i64,
    /// Defaults to the caller's own therapist profile.
    pub therapist_id: Option<i64>,
    pub task_id: i64,
    pub due_date: Option<NaiveDate>,
    pub completed: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateAssignmentRequest {
    pub due_date: Option<NaiveDate>,
    pub completed: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssignmentFilter {
    pub completed: Option<bool>,
    pub therapist_id: Option<i64>,
    pub child_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub difficulty: Option<String>,
    pub speech_area: Option<String>,
    pub assigned_after: Option<NaiveDate>,
    pub assigned_before: Option<NaiveDate>,
    pub due_after: Option<NaiveDate>,
    pub due_before: Option<NaiveDate>,
}

/// Batch assignment of tasks to a client's child.
#[derive(Debug, Deserialize)]
pub struct AssignTasksRequest {
    pub parent_id: i64,
    #[serde(alias = "task_ids")]
    pub selected_tasks: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssignTasksResult {
    pub success: bool,
    pub message: String,
    pub child_name: String,
    pub assignments_created: u64,
    pub child_created: bool,
}
