use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        assignment::{AssignTasksRequest, AssignTasksResult},
        auth::Actor,
        client::ParentProfile,
        taxonomy::{
            LongTermGoal, LongTermGoalRequest, ShortTermGoal, ShortTermGoalRequest, Task, TaskFilter, TaskRequest,
        },
    },
    services::{
        assignments::AssignmentService,
        taxonomy::TaxonomyService,
        wizard::{WizardContext, WizardService},
    },
    AppState,
};

pub async fn clients(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<ParentProfile>>> {
    Ok(Json(WizardService::clients(&state.db, &actor).await?))
}

pub async fn context(
    State(state): State<AppState>,
    actor: Actor,
    Path(client_id): Path<i64>,
) -> AppResult<Json<WizardContext>> {
    Ok(Json(WizardService::context(&state.db, &actor, client_id).await?))
}

pub async fn long_term_goals(
    State(state): State<AppState>,
    _actor: Actor,
    Path(speech_area_id): Path<i64>,
) -> AppResult<Json<Vec<LongTermGoal>>> {
    Ok(Json(TaxonomyService::list_long_term_goals(&state.db, Some(speech_area_id)).await?))
}

pub async fn short_term_goals(
    State(state): State<AppState>,
    _actor: Actor,
    Path(long_term_goal_id): Path<i64>,
) -> AppResult<Json<Vec<ShortTermGoal>>> {
    Ok(Json(TaxonomyService::list_short_term_goals(&state.db, Some(long_term_goal_id)).await?))
}

pub async fn tasks(
    State(state): State<AppState>,
    _actor: Actor,
    Path(short_term_goal_id): Path<i64>,
) -> AppResult<Json<Vec<Task>>> {
    let filter = TaskFilter {
        short_term_goal_id: Some(short_term_goal_id),
        ..TaskFilter::default()
    };
    Ok(Json(TaxonomyService::list_tasks(&state.db, &filter).await?))
}

pub async fn create_long_term_goal(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<LongTermGoalRequest>,
) -> AppResult<(StatusCode, Json<LongTermGoal>)> {
    let goal = TaxonomyService::create_long_term_goal(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn create_short_term_goal(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<ShortTermGoalRequest>,
) -> AppResult<(StatusCode, Json<ShortTermGoal>)> {
    let goal = TaxonomyService::create_short_term_goal(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

pub async fn create_task(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<TaskRequest>,
) -> AppResult<(StatusCode, Json<Task>)> {
    let task = TaxonomyService::create_task(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// POST /wizard/assign
pub async fn assign(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<AssignTasksRequest>,
) -> AppResult<Json<AssignTasksResult>> {
    Ok(Json(AssignmentService::assign_tasks(&state.db, &state.config, &actor, &body).await?))
}
