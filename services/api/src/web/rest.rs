//! services/api/src/web/rest.rs
//!
//! Contains the service-level handlers and the master definition for the
//! OpenAPI specification.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::error::ErrorBody;
use crate::web::{auth, planning, projects};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        auth::register_handler,
        auth::login_handler,
        auth::logout_handler,
        auth::session_handler,
        projects::list_projects_handler,
        projects::create_project_handler,
        projects::get_project_handler,
        projects::update_project_handler,
        projects::delete_project_handler,
        planning::generate_questions_handler,
        planning::list_questions_handler,
        planning::submit_answers_handler,
        planning::generate_prd_handler,
    ),
    components(
        schemas(
            ErrorBody,
            HealthResponse,
            auth::RegisterRequest,
            auth::LoginRequest,
            auth::AuthResponse,
            auth::UserData,
            auth::UserResponse,
            auth::LogoutResponse,
            projects::ProjectResponse,
            projects::ProjectListResponse,
            projects::Pagination,
            projects::CreateProjectRequest,
            projects::UpdateProjectRequest,
            projects::DeleteProjectResponse,
            planning::QuestionResponse,
            planning::QuestionListResponse,
            planning::AnswerInput,
            planning::SubmitAnswersRequest,
            planning::SubmitAnswersResponse,
            planning::PrdResponse,
        )
    ),
    tags(
        (name = "Project Planner API", description = "Planning projects, AI questions and PRD generation."),
        (name = "Auth", description = "Registration and cookie sessions."),
        (name = "Projects", description = "Project CRUD, scoped to the owner."),
        (name = "Planning", description = "Question generation, answers and PRDs. Generation is rate limited.")
    )
)]
pub struct ApiDoc;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness probe; reachable without a session.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "Project Planner API"
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

pub async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new("Not found").with_message("Route not found")),
    )
}
