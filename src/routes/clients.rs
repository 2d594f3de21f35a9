use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        auth::Actor,
        client::{ClientFilter, CreateClientRequest, ParentProfile, UpdateClientRequest},
    },
    services::clients::ClientService,
    AppState,
};

pub async fn list_clients(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<ClientFilter>,
) -> AppResult<Json<Vec<ParentProfile>>> {
    Ok(Json(ClientService::list(&state.db, &actor, &filter).await?))
}

pub async fn get_client(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<Json<ParentProfile>> {
    Ok(Json(ClientService::get(&state.db, &actor, id).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreateClientRequest>,
) -> AppResult<(StatusCode, Json<ParentProfile>)> {
    let client = ClientService::create(&state.db, &state.config, state.email.clone(), &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn update_client(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateClientRequest>,
) -> AppResult<Json<ParentProfile>> {
    Ok(Json(ClientService::update(&state.db, &actor, id, &body).await?))
}

pub async fn delete_client(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    ClientService::delete(&state.db, &state.config, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
