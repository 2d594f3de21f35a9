use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        assignment::{
            AssignTasksRequest, AssignTasksResult, Assignment, AssignmentFilter, CreateAssignmentRequest,
            UpdateAssignmentRequest,
        },
        auth::Actor,
    },
    services::assignments::AssignmentService,
    AppState,
};

pub async fn list_assignments(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<AssignmentFilter>,
) -> AppResult<Json<Vec<Assignment>>> {
    Ok(Json(AssignmentService::list(&state.db, &actor, &filter).await?))
}

pub async fn get_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<Json<Assignment>> {
    Ok(Json(AssignmentService::get(&state.db, &actor, id).await?))
}

pub async fn create_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreateAssignmentRequest>,
) -> AppResult<(StatusCode, Json<Assignment>)> {
    let assignment = AssignmentService::create(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

pub async fn update_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAssignmentRequest>,
) -> AppResult<Json<Assignment>> {
    Ok(Json(AssignmentService::update(&state.db, &actor, id, &body).await?))
}

pub async fn delete_assignment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    AssignmentService::delete(&state.db, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /assign-tasks
pub async fn assign_tasks(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<AssignTasksRequest>,
) -> AppResult<Json<AssignTasksResult>> {
    Ok(Json(AssignmentService::assign_tasks(&state.db, &state.config, &actor, &body).await?))
}
