use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::{
        auth::Actor,
        taxonomy::{
            Difficulty, LongTermGoal, LongTermGoalRequest, ShortTermGoal, ShortTermGoalRequest, SpeechArea,
            SpeechAreaRequest, Task, TaskFilter, TaskRequest, UpdateGoalRequest, UpdateSpeechAreaRequest,
            UpdateTaskRequest,
        },
    },
    policy::{EntityKind, Operation, PolicyEngine},
};

const SPEECH_AREA_SELECT: &str = "SELECT s.*,
        (SELECT COUNT(*) FROM long_term_goals l2 WHERE l2.speech_area_id = s.id) AS long_term_goals_count
     FROM speech_areas s";

const LONG_TERM_GOAL_SELECT: &str = "SELECT l.*, s.name AS speech_area_name,
        (SELECT COUNT(*) FROM short_term_goals g2 WHERE g2.long_term_goal_id = l.id) AS short_term_goals_count
     FROM long_term_goals l
     JOIN speech_areas s ON s.id = l.speech_area_id";

const SHORT_TERM_GOAL_SELECT: &str = "SELECT g.*, l.title AS long_term_goal_title, s.name AS speech_area_name,
        (SELECT COUNT(*) FROM tasks t2 WHERE t2.short_term_goal_id = g.id) AS tasks_count
     FROM short_term_goals g
     JOIN long_term_goals l ON l.id = g.long_term_goal_id
     JOIN speech_areas s ON s.id = l.speech_area_id";

const TASK_SELECT: &str = "SELECT t.*, g.title AS short_term_goal_title, l.title AS long_term_goal_title,
        s.name AS speech_area_name,
        (SELECT COUNT(*) FROM assignments a2 WHERE a2.task_id = t.id) AS assignments_count
     FROM tasks t
     LEFT JOIN short_term_goals g ON g.id = t.short_term_goal_id
     LEFT JOIN long_term_goals l ON l.id = g.long_term_goal_id
     LEFT JOIN speech_areas s ON s.id = l.speech_area_id";

fn required_title(title: &str) -> AppResult<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::validation("Title is required."));
    }
    Ok(title)
}

fn parse_difficulty(raw: Option<&str>) -> AppResult<Option<Difficulty>> {
    raw.filter(|d| !d.trim().is_empty())
        .map(|d| d.parse::<Difficulty>().map_err(AppError::Validation))
        .transpose()
}

async fn exists(pool: &PgPool, table: &str, id: i64) -> AppResult<bool> {
    let found: bool = sqlx::query_scalar(&format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = $1)"))
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(found)
}

/// The goal taxonomy is shared reference data: readable by everyone, lists
/// show active rows only, detail reads show any row.
pub struct TaxonomyService;

impl TaxonomyService {
    // ─── Speech areas ────────────────────────────────────────────────────────

    pub async fn list_speech_areas(pool: &PgPool) -> AppResult<Vec<SpeechArea>> {
        let rows = sqlx::query_as::<_, SpeechArea>(&format!(
            "{SPEECH_AREA_SELECT} WHERE s.is_active = TRUE ORDER BY s.name"
        ))
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_speech_area(pool: &PgPool, id: i64) -> AppResult<SpeechArea> {
        sqlx::query_as::<_, SpeechArea>(&format!("{SPEECH_AREA_SELECT} WHERE s.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Speech area not found"))
    }

    pub async fn create_speech_area(pool: &PgPool, actor: &Actor, req: &SpeechAreaRequest) -> AppResult<SpeechArea> {
        PolicyEngine::authorize(actor, EntityKind::SpeechArea, Operation::Add, None)?;
        let name = req.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("Name is required."));
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO speech_areas (name, description, is_active)
             VALUES ($1, $2, COALESCE($3, TRUE)) RETURNING id",
        )
        .bind(name)
        .bind(&req.description)
        .bind(req.is_active)
        .fetch_one(pool)
        .await?;
        Self::get_speech_area(pool, id).await
    }

    pub async fn update_speech_area(
        pool: &PgPool,
        actor: &Actor,
        id: i64,
        req: &UpdateSpeechAreaRequest,
    ) -> AppResult<SpeechArea> {
        PolicyEngine::authorize(actor, EntityKind::SpeechArea, Operation::Change, None)?;
        Self::get_speech_area(pool, id).await?;
        if matches!(req.name.as_deref(), Some(n) if n.trim().is_empty()) {
            return Err(AppError::validation("Name cannot be empty."));
        }
        sqlx::query(
            "UPDATE speech_areas
             SET name        = COALESCE($1, name),
                 description = COALESCE($2, description),
                 is_active   = COALESCE($3, is_active)
             WHERE id = $4",
        )
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.is_active)
        .bind(id)
        .execute(pool)
        .await?;
        Self::get_speech_area(pool, id).await
    }

    // ─── Long-term goals ─────────────────────────────────────────────────────

    pub async fn list_long_term_goals(pool: &PgPool, speech_area_id: Option<i64>) -> AppResult<Vec<LongTermGoal>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("{LONG_TERM_GOAL_SELECT} WHERE l.is_active = TRUE"));
        if let Some(area) = speech_area_id {
            qb.push(" AND l.speech_area_id = ").push_bind(area);
        }
        qb.push(" ORDER BY s.name, l.title");
        let rows = qb.build_query_as::<LongTermGoal>().fetch_all(pool).await?;
        Ok(rows)
    }

    pub async fn get_long_term_goal(pool: &PgPool, id: i64) -> AppResult<LongTermGoal> {
        sqlx::query_as::<_, LongTermGoal>(&format!("{LONG_TERM_GOAL_SELECT} WHERE l.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Long-term goal not found"))
    }

    pub async fn create_long_term_goal(
        pool: &PgPool,
        actor: &Actor,
        req: &LongTermGoalRequest,
    ) -> AppResult<LongTermGoal> {
        PolicyEngine::authorize(actor, EntityKind::LongTermGoal, Operation::Add, None)?;
        let title = required_title(&req.title)?;
        if !exists(pool, "speech_areas", req.speech_area_id).await? {
            return Err(AppError::validation("Select a valid speech area."));
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO long_term_goals (speech_area_id, title, description, is_active)
             VALUES ($1, $2, $3, COALESCE($4, TRUE)) RETURNING id",
        )
        .bind(req.speech_area_id)
        .bind(title)
        .bind(&req.description)
        .bind(req.is_active)
        .fetch_one(pool)
        .await?;
        Self::get_long_term_goal(pool, id).await
    }

    pub async fn update_long_term_goal(
        pool: &PgPool,
        actor: &Actor,
        id: i64,
        req: &UpdateGoalRequest,
    ) -> AppResult<LongTermGoal> {
        PolicyEngine::authorize(actor, EntityKind::LongTermGoal, Operation::Change, None)?;
        Self::get_long_term_goal(pool, id).await?;
        if let Some(title) = req.title.as_deref() {
            required_title(title)?;
        }
        if let Some(area) = req.parent_id {
            if !exists(pool, "speech_areas", area).await? {
                return Err(AppError::validation("Select a valid speech area."));
            }
        }
        sqlx::query(
            "UPDATE long_term_goals
             SET speech_area_id = COALESCE($1, speech_area_id),
                 title          = COALESCE($2, title),
                 description    = COALESCE($3, description),
                 is_active      = COALESCE($4, is_active)
             WHERE id = $5",
        )
        .bind(req.parent_id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.is_active)
        .bind(id)
        .execute(pool)
        .await?;
        Self::get_long_term_goal(pool, id).await
    }

    // ─── Short-term goals ────────────────────────────────────────────────────

    pub async fn list_short_term_goals(
        pool: &PgPool,
        long_term_goal_id: Option<i64>,
    ) -> AppResult<Vec<ShortTermGoal>> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("{SHORT_TERM_GOAL_SELECT} WHERE g.is_active = TRUE"));
        if let Some(goal) = long_term_goal_id {
            qb.push(" AND g.long_term_goal_id = ").push_bind(goal);
        }
        qb.push(" ORDER BY s.name, l.title, g.title");
        let rows = qb.build_query_as::<ShortTermGoal>().fetch_all(pool).await?;
        Ok(rows)
    }

    pub async fn get_short_term_goal(pool: &PgPool, id: i64) -> AppResult<ShortTermGoal> {
        sqlx::query_as::<_, ShortTermGoal>(&format!("{SHORT_TERM_GOAL_SELECT} WHERE g.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Short-term goal not found"))
    }

    pub async fn create_short_term_goal(
        pool: &PgPool,
        actor: &Actor,
        req: &ShortTermGoalRequest,
    ) -> AppResult<ShortTermGoal> {
        PolicyEngine::authorize(actor, EntityKind::ShortTermGoal, Operation::Add, None)?;
        let title = required_title(&req.title)?;
        if !exists(pool, "long_term_goals", req.long_term_goal_id).await? {
            return Err(AppError::validation("Select a valid long-term goal."));
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO short_term_goals (long_term_goal_id, title, description, is_active)
             VALUES ($1, $2, $3, COALESCE($4, TRUE)) RETURNING id",
        )
        .bind(req.long_term_goal_id)
        .bind(title)
        .bind(&req.description)
        .bind(req.is_active)
        .fetch_one(pool)
        .await?;
        Self::get_short_term_goal(pool, id).await
    }

    pub async fn update_short_term_goal(
        pool: &PgPool,
        actor: &Actor,
        id: i64,
        req: &UpdateGoalRequest,
    ) -> AppResult<ShortTermGoal> {
        PolicyEngine::authorize(actor, EntityKind::ShortTermGoal, Operation::Change, None)?;
        Self::get_short_term_goal(pool, id).await?;
        if let Some(title) = req.title.as_deref() {
            required_title(title)?;
        }
        if let Some(goal) = req.parent_id {
            if !exists(pool, "long_term_goals", goal).await? {
                return Err(AppError::validation("Select a valid long-term goal."));
            }
        }
        sqlx::query(
            "UPDATE short_term_goals
             SET long_term_goal_id = COALESCE($1, long_term_goal_id),
                 title             = COALESCE($2, title),
                 description       = COALESCE($3, description),
                 is_active         = COALESCE($4, is_active)
             WHERE id = $5",
        )
        .bind(req.parent_id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(req.is_active)
        .bind(id)
        .execute(pool)
        .await?;
        Self::get_short_term_goal(pool, id).await
    }

    // ─── Tasks ───────────────────────────────────────────────────────────────

    pub async fn list_tasks(pool: &PgPool, filter: &TaskFilter) -> AppResult<Vec<Task>> {
        let difficulty = parse_difficulty(filter.difficulty.as_deref())?;
        let mut qb = QueryBuilder::<Postgres>::new(format!("{TASK_SELECT} WHERE t.is_active = TRUE"));
        if let Some(d) = difficulty {
            qb.push(" AND t.difficulty = ").push_bind(d.as_str());
        }
        if let Some(area) = filter.speech_area_id {
            qb.push(" AND s.id = ").push_bind(area);
        }
        if let Some(goal) = filter.long_term_goal_id {
            qb.push(" AND l.id = ").push_bind(goal);
        }
        if let Some(goal) = filter.short_term_goal_id {
            qb.push(" AND t.short_term_goal_id = ").push_bind(goal);
        }
        if let Some(title) = filter.title.as_deref().filter(|t| !t.trim().is_empty()) {
            qb.push(" AND t.title ILIKE ").push_bind(format!("%{}%", title.trim()));
        }
        qb.push(" ORDER BY t.title, t.id");
        let rows = qb.build_query_as::<Task>().fetch_all(pool).await?;
        Ok(rows)
    }

    pub async fn get_task(pool: &PgPool, id: i64) -> AppResult<Task> {
        sqlx::query_as::<_, Task>(&format!("{TASK_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| AppError::not_found("Task not found"))
    }

    pub async fn create_task(pool: &PgPool, actor: &Actor, req: &TaskRequest) -> AppResult<Task> {
        PolicyEngine::authorize(actor, EntityKind::Task, Operation::Add, None)?;
        let title = required_title(&req.title)?;
        let difficulty = parse_difficulty(req.difficulty.as_deref())?.unwrap_or_default();
        if let Some(goal) = req.short_term_goal_id {
            if !exists(pool, "short_term_goals", goal).await? {
                return Err(AppError::validation("Select a valid short-term goal."));
            }
        }
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO tasks (short_term_goal_id, title, description, difficulty, is_active)
             VALUES ($1, $2, $3, $4, COALESCE($5, TRUE)) RETURNING id",
        )
        .bind(req.short_term_goal_id)
        .bind(title)
        .bind(&req.description)
        .bind(difficulty.as_str())
        .bind(req.is_active)
        .fetch_one(pool)
        .await?;
        Self::get_task(pool, id).await
    }

    pub async fn update_task(pool: &PgPool, actor: &Actor, id: i64, req: &UpdateTaskRequest) -> AppResult<Task> {
        PolicyEngine::authorize(actor, EntityKind::Task, Operation::Change, None)?;
        Self::get_task(pool, id).await?;
        if let Some(title) = req.title.as_deref() {
            required_title(title)?;
        }
        let difficulty = parse_difficulty(req.difficulty.as_deref())?;
        if let Some(goal) = req.short_term_goal_id {
            if !exists(pool, "short_term_goals", goal).await? {
                return Err(AppError::validation("Select a valid short-term goal."));
            }
        }
        sqlx::query(
            "UPDATE tasks
             SET short_term_goal_id = COALESCE($1, short_term_goal_id),
                 title              = COALESCE($2, title),
                 description        = COALESCE($3, description),
                 difficulty         = COALESCE($4, difficulty),
                 is_active          = COALESCE($5, is_active)
             WHERE id = $6",
        )
        .bind(req.short_term_goal_id)
        .bind(req.title.as_deref().map(str::trim))
        .bind(&req.description)
        .bind(difficulty.map(|d| d.as_str()))
        .bind(req.is_active)
        .bind(id)
        .execute(pool)
        .await?;
        Self::get_task(pool, id).await
    }

    /// Delete any taxonomy row. Children cascade in the schema.
    pub async fn delete(pool: &PgPool, actor: &Actor, kind: EntityKind, id: i64) -> AppResult<()> {
        let (table, label) = match kind {
            EntityKind::SpeechArea => ("speech_areas", "Speech area"),
            EntityKind::LongTermGoal => ("long_term_goals", "Long-term goal"),
            EntityKind::ShortTermGoal => ("short_term_goals", "Short-term goal"),
            EntityKind::Task => ("tasks", "Task"),
            other => return Err(AppError::Internal(anyhow::anyhow!("{other} is not a taxonomy entity"))),
        };
        PolicyEngine::authorize(actor, kind, Operation::Delete, None)?;
        let result = sqlx::query(&format!("DELETE FROM {table} WHERE id = $1"))
            .bind(id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("{label} not found")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_difficulty_is_a_validation_error() {
        assert!(matches!(parse_difficulty(Some("expert")), Err(AppError::Validation(_))));
        assert_eq!(parse_difficulty(Some("intermediate")).unwrap(), Some(Difficulty::Intermediate));
        assert_eq!(parse_difficulty(Some("")).unwrap(), None);
        assert_eq!(parse_difficulty(None).unwrap(), None);
    }

    #[test]
    fn titles_are_required() {
        assert!(required_title("   ").is_err());
        assert_eq!(required_title(" Say /s/ ").unwrap(), "Say /s/");
    }
}
