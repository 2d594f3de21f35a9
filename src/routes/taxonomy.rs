use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::{
    error::AppResult,
    models::{
        auth::Actor,
        taxonomy::{
            LongTermGoal, LongTermGoalRequest, ShortTermGoal, ShortTermGoalRequest, SpeechArea, SpeechAreaRequest,
            Task, TaskFilter, TaskRequest, UpdateGoalRequest, UpdateSpeechAreaRequest, UpdateTaskRequest,
        },
    },
    policy::EntityKind,
    services::taxonomy::TaxonomyService,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct GoalQuery {
    pub speech_area_id: Option<i64>,
    pub long_term_goal_id: Option<i64>,
}

// ─── Speech areas ────────────────────────────────────────────────────────────

pub async fn list_speech_areas(State(state): State<AppState>, _actor: Actor) -> AppResult<Json<Vec<SpeechArea>>> {
    Ok(Json(TaxonomyService::list_speech_areas(&state.db).await?))
}

pub async fn get_speech_area(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<Json<SpeechArea>> {
    Ok(Json(TaxonomyService::get_speech_area(&state.db, id).await?))
}

pub async fn create_speech_area(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<SpeechAreaRequest>,
) -> AppResult<(StatusCode, Json<SpeechArea>)> {
    let area = TaxonomyService::create_speech_area(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(area)))
}

pub async fn update_speech_area(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateSpeechAreaRequest>,
) -> AppResult<Json<SpeechArea>> {
    Ok(Json(TaxonomyService::update_speech_area(&state.db, &actor, id, &body).await?))
}

pub async fn delete_speech_area(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    TaxonomyService::delete(&state.db, &actor, EntityKind::SpeechArea, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Long-term goals ─────────────────────────────────────────────────────────

pub async fn list_long_term_goals(
    State(state): State<AppState>,
    _actor: Actor,
    Query(q): Query<GoalQuery>,
) -> AppResult<Json<Vec<LongTermGoal>>> {
    Ok(Json(TaxonomyService::list_long_term_goals(&state.db, q.speech_area_id).await?))
}

pub async fn get_long_term_goal(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<Json<LongTermGoal>> {
    Ok(Json(TaxonomyService::get_long_term_goal(&state.db, id).await?))
}

pub async fn create_long_term_goal(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<LongTermGoalRequest>,
) -> AppResult<(StatusCode, Json<LongTermGoal>)> {
    let goal = TaxonomyService::create_long_term_goal(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn update_long_term_goal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateGoalRequest>,
) -> AppResult<Json<LongTermGoal>> {
    Ok(Json(TaxonomyService::update_long_term_goal(&state.db, &actor, id, &body).await?))
}

pub async fn delete_long_term_goal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    TaxonomyService::delete(&state.db, &actor, EntityKind::LongTermGoal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Short-term goals ────────────────────────────────────────────────────────

pub async fn list_short_term_goals(
    State(state): State<AppState>,
    _actor: Actor,
    Query(q): Query<GoalQuery>,
) -> AppResult<Json<Vec<ShortTermGoal>>> {
    Ok(Json(TaxonomyService::list_short_term_goals(&state.db, q.long_term_goal_id).await?))
}

pub async fn get_short_term_goal(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<Json<ShortTermGoal>> {
    Ok(Json(TaxonomyService::get_short_term_goal(&state.db, id).await?))
}

pub async fn create_short_term_goal(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<ShortTermGoalRequest>,
) -> AppResult<(StatusCode, Json<ShortTermGoal>)> {
    let goal = TaxonomyService::create_short_term_goal(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn update_short_term_goal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateGoalRequest>,
) -> AppResult<Json<ShortTermGoal>> {
    Ok(Json(TaxonomyService::update_short_term_goal(&state.db, &actor, id, &body).await?))
}

pub async fn delete_short_term_goal(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    TaxonomyService::delete(&state.db, &actor, EntityKind::ShortTermGoal, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Tasks ───────────────────────────────────────────────────────────────────

pub async fn list_tasks(
    State(state): State<AppState>,
    _actor: Actor,
    Query(filter): Query<TaskFilter>,
) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(TaxonomyService::list_tasks(&state.db, &filter).await?))
}

pub async fn get_task(State(state): State<AppState>, _actor: Actor, Path(id): Path<i64>) -> AppResult<Json<Task>> {
    Ok(Json(TaxonomyService::get_task(&state.db, id).await?))
}

pub async fn create_task(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<TaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let task = TaxonomyService::create_task(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTaskRequest>,
) -> AppResult<Json<Task>> {
    Ok(Json(TaxonomyService::update_task(&state.db, &actor, id, &body).await?))
}

pub async fn delete_task(State(state): State<AppState>, actor: Actor, Path(id): Path<i64>) -> AppResult<StatusCode> {
    TaxonomyService::delete(&state.db, &actor, EntityKind::Task, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
