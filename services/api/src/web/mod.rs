pub mod auth;
pub mod middleware;
pub mod planning;
pub mod projects;
pub mod rate_limit;
pub mod rest;
pub mod state;

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::{ApiError, ApiResult};
use rest::ApiDoc;
use state::AppState;

pub use middleware::require_session;
pub use rate_limit::enforce_rate_limit;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Unwraps a JSON body, turning any rejection into a 400 envelope.
pub fn json_payload<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload.map(|Json(value)| value).map_err(|rejection| {
        ApiError::validation_with(
            "Invalid request body",
            serde_json::json!({ "body": rejection.body_text() }),
        )
    })
}

/// Builds the complete application router.
///
/// Every route behind the session guard, with the rate limiter nested inside
/// it. The health probe and the API docs stay public.
pub fn router(state: Arc<AppState>) -> Router {
    let guarded = Router::new()
        // --- Auth ---
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/auth/session", get(auth::session_handler))
        // --- Projects ---
        .route(
            "/api/projects",
            get(projects::list_projects_handler).post(projects::create_project_handler),
        )
        .route(
            "/api/projects/{id}",
            get(projects::get_project_handler)
                .put(projects::update_project_handler)
                .delete(projects::delete_project_handler),
        )
        // --- Planning ---
        .route(
            "/api/projects/{id}/generate-questions",
            post(planning::generate_questions_handler),
        )
        .route(
            "/api/projects/{id}/planning-questions",
            get(planning::list_questions_handler).post(planning::submit_answers_handler),
        )
        .route("/api/projects/{id}/generate-prd", post(planning::generate_prd_handler))
        .fallback(rest::not_found_handler)
        .layer(axum_middleware::from_fn_with_state(state.clone(), enforce_rate_limit))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_session))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state);

    Router::new()
        .route("/health", get(rest::health_handler))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(guarded)
}
