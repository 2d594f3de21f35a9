//! Speech-therapy goal taxonomy: speech area, long-term goal, short-term goal, task.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SpeechArea {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub long_term_goals_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LongTermGoal {
    pub id: i64,
    pub speech_area_id: i64,
    pub speech_area_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub short_term_goals_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ShortTermGoal {
    pub id: i64,
    pub long_term_goal_id: i64,
    pub long_term_goal_title: Option<String>,
    pub speech_area_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub tasks_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i64,
    pub short_term_goal_id: Option<i64>,
    pub short_term_goal_title: Option<String>,
    pub long_term_goal_title: Option<String>,
    pub speech_area_name: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: String,
    pub is_active: bool,
    pub assignments_count: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Difficulty::Beginner),
            "intermediate" => Ok(Difficulty::Intermediate),
            "advanced" => Ok(Difficulty::Advanced),
            other => Err(format!("Unknown difficulty: {other}")),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SpeechAreaRequest {
    pub name: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSpeechAreaRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct LongTermGoalRequest {
    pub speech_area_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ShortTermGoalRequest {
    pub long_term_goal_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Partial update shared by long-term and short-term goals. The parent id
/// is the speech area or long-term goal respectively.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateGoalRequest {
    pub parent_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// `difficulty` stays a string so an unknown value is a validation error,
/// not a body-parse rejection.
#[derive(Debug, Deserialize)]
pub struct TaskRequest {
    pub short_term_goal_id: Option<i64>,
    pub title: String,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub short_term_goal_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub difficulty: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskFilter {
    pub difficulty: Option<String>,
    pub speech_area_id: Option<i64>,
    pub long_term_goal_id: Option<i64>,
    pub short_term_goal_id: Option<i64>,
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_parses_known_levels_only() {
        assert_eq!("Advanced".parse::<Difficulty>(), Ok(Difficulty::Advanced));
        assert_eq!(" beginner ".parse::<Difficulty>(), Ok(Difficulty::Beginner));
        assert!("expert".parse::<Difficulty>().is_err());
    }
}
