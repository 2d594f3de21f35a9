pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod routes;
pub mod services;
pub mod store;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use middleware::auth::JwtSecret;
use services::email::EmailService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: redis::aio::MultiplexedConnection,
    pub config: Arc<Config>,
    pub email: Option<Arc<EmailService>>,
}

/// Allow the configured front-end origin, plus localhost during development.
fn cors_layer(base_url: &str) -> CorsLayer {
    let base = base_url.trim_end_matches('/').to_string();
    let origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| match origin.to_str() {
        Ok(o) => o == base || o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1"),
        Err(_) => false,
    });

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT]))
        .allow_origin(origin)
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.app_base_url);
    let jwt_secret = JwtSecret(state.config.jwt_secret.clone());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        // Auth
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh", post(routes::auth::refresh_token))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/change-password", post(routes::auth::change_password))
        .route("/auth/reset-password", post(routes::auth::reset_password))
        .route("/auth/me", get(routes::auth::me))
        // Clinics
        .route("/clinics", get(routes::clinics::list_clinics).post(routes::clinics::create_clinic))
        .route(
            "/clinics/{id}",
            get(routes::clinics::get_clinic)
                .put(routes::clinics::update_clinic)
                .patch(routes::clinics::update_clinic)
                .delete(routes::clinics::delete_clinic),
        )
        // Therapists
        .route(
            "/therapists",
            get(routes::therapists::list_therapists).post(routes::therapists::create_therapist),
        )
        .route(
            "/therapists/{id}",
            get(routes::therapists::get_therapist)
                .put(routes::therapists::update_therapist)
                .patch(routes::therapists::update_therapist)
                .delete(routes::therapists::delete_therapist),
        )
        .route("/therapist/clients", get(routes::therapists::my_clients))
        // Clients (parent profiles)
        .route("/clients", get(routes::clients::list_clients).post(routes::clients::create_client))
        .route(
            "/clients/{id}",
            get(routes::clients::get_client)
                .put(routes::clients::update_client)
                .patch(routes::clients::update_client)
                .delete(routes::clients::delete_client),
        )
        // Children
        .route("/children", get(routes::children::list_children).post(routes::children::create_child))
        .route(
            "/children/{id}",
            get(routes::children::get_child)
                .put(routes::children::update_child)
                .patch(routes::children::update_child)
                .delete(routes::children::delete_child),
        )
        .route("/parent/children", get(routes::children::my_children))
        // Goal taxonomy
        .route(
            "/speech-areas",
            get(routes::taxonomy::list_speech_areas).post(routes::taxonomy::create_speech_area),
        )
        .route(
            "/speech-areas/{id}",
            get(routes::taxonomy::get_speech_area)
                .put(routes::taxonomy::update_speech_area)
                .patch(routes::taxonomy::update_speech_area)
                .delete(routes::taxonomy::delete_speech_area),
        )
        .route(
            "/long-term-goals",
            get(routes::taxonomy::list_long_term_goals).post(routes::taxonomy::create_long_term_goal),
        )
        .route(
            "/long-term-goals/{id}",
            get(routes::taxonomy::get_long_term_goal)
                .put(routes::taxonomy::update_long_term_goal)
                .patch(routes::taxonomy::update_long_term_goal)
                .delete(routes::taxonomy::delete_long_term_goal),
        )
        .route(
            "/short-term-goals",
            get(routes::taxonomy::list_short_term_goals).post(routes::taxonomy::create_short_term_goal),
        )
        .route(
            "/short-term-goals/{id}",
            get(routes::taxonomy::get_short_term_goal)
                .put(routes::taxonomy::update_short_term_goal)
                .patch(routes::taxonomy::update_short_term_goal)
                .delete(routes::taxonomy::delete_short_term_goal),
        )
        .route("/tasks", get(routes::taxonomy::list_tasks).post(routes::taxonomy::create_task))
        .route(
            "/tasks/{id}",
            get(routes::taxonomy::get_task)
                .put(routes::taxonomy::update_task)
                .patch(routes::taxonomy::update_task)
                .delete(routes::taxonomy::delete_task),
        )
        // Assignments
        .route(
            "/assignments",
            get(routes::assignments::list_assignments).post(routes::assignments::create_assignment),
        )
        .route(
            "/assignments/{id}",
            get(routes::assignments::get_assignment)
                .put(routes::assignments::update_assignment)
                .patch(routes::assignments::update_assignment)
                .delete(routes::assignments::delete_assignment),
        )
        .route("/assign-tasks", post(routes::assignments::assign_tasks))
        // Wizard
        .route("/wizard/clients", get(routes::wizard::clients))
        .route("/wizard/clients/{id}", get(routes::wizard::context))
        .route("/wizard/speech-areas/{id}/long-term-goals", get(routes::wizard::long_term_goals))
        .route("/wizard/long-term-goals", post(routes::wizard::create_long_term_goal))
        .route("/wizard/long-term-goals/{id}/short-term-goals", get(routes::wizard::short_term_goals))
        .route("/wizard/short-term-goals", post(routes::wizard::create_short_term_goal))
        .route("/wizard/short-term-goals/{id}/tasks", get(routes::wizard::tasks))
        .route("/wizard/tasks", post(routes::wizard::create_task))
        .route("/wizard/assign", post(routes::wizard::assign))
        // Users
        .route("/users", get(routes::users::list_users).post(routes::users::create_user))
        .route(
            "/users/{id}",
            get(routes::users::get_user)
                .put(routes::users::update_user)
                .patch(routes::users::update_user)
                .delete(routes::users::delete_user),
        )
        .route("/roles", get(routes::users::list_roles))
        .route("/dashboard/stats", get(routes::stats::dashboard_stats))
        .layer(axum::Extension(jwt_secret))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
