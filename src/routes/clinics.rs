use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        auth::Actor,
        clinic::{Clinic, CreateClinicRequest, UpdateClinicRequest},
    },
    services::clinics::ClinicService,
    AppState,
};

pub async fn list_clinics(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<Clinic>>> {
    Ok(Json(ClinicService::list(&state.db, &actor).await?))
}

pub async fn get_clinic(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<Json<Clinic>> {
    Ok(Json(ClinicService::get(&state.db, &actor, id).await?))
}

pub async fn create_clinic(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreateClinicRequest>,
) -> AppResult<(StatusCode, Json<Clinic>)> {
    let clinic = ClinicService::create(&state.db, &state.config, state.email.clone(), &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(clinic)))
}

pub async fn update_clinic(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateClinicRequest>,
) -> AppResult<Json<Clinic>> {
    let clinic = ClinicService::update(&state.db, &state.config, state.email.clone(), &actor, id, &body).await?;
    Ok(Json(clinic))
}

pub async fn delete_clinic(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    ClinicService::delete(&state.db, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
