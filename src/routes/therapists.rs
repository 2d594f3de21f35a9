use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        auth::Actor,
        client::ParentProfile,
        therapist::{CreateTherapistRequest, TherapistFilter, TherapistProfile, UpdateTherapistRequest},
    },
    services::{clients::ClientService, therapists::TherapistService},
    AppState,
};

pub async fn list_therapists(
    State(state): State<AppState>,
    actor: Actor,
    Query(filter): Query<TherapistFilter>,
) -> AppResult<Json<Vec<TherapistProfile>>> {
    Ok(Json(TherapistService::list(&state.db, &actor, &filter).await?))
}

pub async fn get_therapist(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<Json<TherapistProfile>> {
    Ok(Json(TherapistService::get(&state.db, &actor, id).await?))
}

pub async fn create_therapist(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreateTherapistRequest>,
) -> AppResult<(StatusCode, Json<TherapistProfile>)> {
    let therapist =
        TherapistService::create(&state.db, &state.config, state.email.clone(), &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(therapist)))
}

pub async fn update_therapist(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTherapistRequest>,
) -> AppResult<Json<TherapistProfile>> {
    Ok(Json(TherapistService::update(&state.db, &actor, id, &body).await?))
}

pub async fn delete_therapist(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    TherapistService::delete(&state.db, &state.config, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /therapist/clients
pub async fn my_clients(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<ParentProfile>>> {
    Ok(Json(ClientService::for_therapist(&state.db, &actor).await?))
}
