use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        auth::Actor,
        user::{CreateUserRequest, RoleRow, UpdateUserRequest, UserProfile},
    },
    services::users::UserService,
    AppState,
};

pub async fn list_users(State(state): State<AppState>, actor: Actor) -> AppResult<Json<Vec<UserProfile>>> {
    let users = UserService::list(&state.db, &actor).await?;
    Ok(Json(users.into_iter().map(UserProfile::from).collect()))
}

pub async fn get_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(UserService::get(&state.db, &actor, id).await?.into()))
}

pub async fn create_user(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    let user = UserService::create(&state.db, &state.config, state.email.clone(), &actor, &body).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn update_user(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUserRequest>,
) -> AppResult<Json<UserProfile>> {
    Ok(Json(UserService::update(&state.db, &actor, id, &body).await?.into()))
}

pub async fn delete_user(State(state): State<AppState>, actor: Actor, Path(id): Path<i64>) -> AppResult<StatusCode> {
    UserService::delete(&state.db, &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Role names are reference data; any authenticated caller may list them.
pub async fn list_roles(State(state): State<AppState>, _actor: Actor) -> AppResult<Json<Vec<RoleRow>>> {
    Ok(Json(UserService::roles(&state.db).await?))
}
