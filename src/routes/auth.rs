use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    middleware::rate_limit::{check_rate_limit, email_key, LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW_SECS},
    models::{
        auth::Actor,
        user::{
            ChangePasswordRequest, LoginRequest, LoginResponse, LogoutRequest, RefreshTokenRequest,
            ResetPasswordRequest, UserProfile,
        },
    },
    services::{
        auth::{AuthService, LoginOutcome},
        users::UserService,
    },
    AppState,
};

pub async fn login(State(state): State<AppState>, Json(body): Json<LoginRequest>) -> AppResult<Response> {
    // Rate limit: 5 attempts per 15 min per email
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &email_key("login", &body.email), LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW_SECS).await?;

    match AuthService::login(&state.db, &state.config, &body.email, &body.password).await? {
        LoginOutcome::Authenticated(response) => Ok(Json(response).into_response()),
        LoginOutcome::PasswordResetRequired { email } => Ok((
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "You must reset your temporary password before logging in.",
                "password_reset_required": true,
                "email": email,
            })),
        )
            .into_response()),
    }
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> AppResult<Json<LoginResponse>> {
    let response = AuthService::refresh(&state.db, &state.config, &body.refresh).await?;
    Ok(Json(response))
}

pub async fn logout(State(state): State<AppState>, Json(body): Json<LogoutRequest>) -> AppResult<Json<Value>> {
    if let Some(token) = body.refresh.as_deref() {
        AuthService::logout(&state.db, &state.config, token).await?;
    }
    Ok(Json(json!({ "message": "Logged out" })))
}

pub async fn change_password(
    State(state): State<AppState>,
    actor: Actor,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    AuthService::change_password(&state.db, actor.user_id, &body).await?;
    Ok(Json(json!({ "message": "Password changed successfully." })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut redis = state.redis.clone();
    check_rate_limit(&mut redis, &email_key("reset", &body.email), LOGIN_MAX_ATTEMPTS, LOGIN_WINDOW_SECS).await?;

    let response = AuthService::reset_password(&state.db, &state.config, &body).await?;
    Ok(Json(response))
}

pub async fn me(State(state): State<AppState>, actor: Actor) -> AppResult<Json<UserProfile>> {
    let user = UserService::me(&state.db, &actor).await?;
    Ok(Json(user.into()))
}
