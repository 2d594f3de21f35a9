use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        auth::Actor,
        child::{Child, CreateChildRequest, UpdateChildRequest},
    },
    services::children::ChildService,
    AppState,
};

pub async fn list_children(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<Child>>> {
    Ok(Json(ChildService::list(&state.db, &actor).await?))
}

pub async fn get_child(State(state): State<AppState>, actor: Actor, Path(id): Path<i64>) -> AppResult<Json<Child>> {
    Ok(Json(ChildService::get(&state.db, &actor, id).await?))
}

pub async fn create_child(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreateChildRequest>,
) -> AppResult<(StatusCode, Json<Child>)> {
    let child = ChildService::create(&state.db, &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(child)))
}

pub async fn update_child(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateChildRequest>,
) -> AppResult<Json<Child>> {
    Ok(Json(ChildService::update(&state.db, &actor, id, &body).await?))
}

pub async fn delete_child(State(state): State<AppState>, actor: Actor, Path(id): Path<i64>) -> AppResult<StatusCode> {
    ChildService::delete(&state.db, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /parent/children
pub async fn my_children(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<Child>>> {
    Ok(Json(ChildService::for_parent(&state.db, &actor).await?))
}
