use axum::{extract::State, Json};

use crate::{
    error::AppResult,
    models::auth::Actor,
    services::stats::{DashboardStats, StatsService},
    AppState,
};

/// GET /dashboard/stats
pub async fn dashboard_stats(State(state): State<AppState>, actor: Actor) -> AppResult<Json<DashboardStats>> {
    Ok(Json(StatsService::dashboard(&state.db, &actor).await?))
}
