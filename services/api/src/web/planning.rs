//! services/api/src/web/planning.rs
//!
//! Handlers for the planning session: generating questions, reading and
//! answering them, and turning the answers into a PRD.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use planning_core::domain::{ProjectStatus, ProjectUpdate, Question, QuestionAnswer};
use planning_core::prd::{generate_and_store_prd, PrdError};
use planning_core::questions::{generate_questions, QuestionBatch, DEFAULT_QUESTION_COUNT};
use planning_core::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, ErrorBody};
use crate::web::json_payload;
use crate::web::projects::ProjectResponse;
use crate::web::state::AppState;

pub const MAX_QUESTION_COUNT: usize = 20;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct QuestionResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub question: String,
    pub answer: Option<String>,
    pub sequence_number: i32,
    pub created_at: DateTime<Utc>,
}

impl From<Question> for QuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            project_id: q.project_id,
            question: q.question,
            answer: q.answer,
            sequence_number: q.sequence_number,
            created_at: q.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct QuestionListResponse {
    pub data: Vec<QuestionResponse>,
    pub project_id: Uuid,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CountParams {
    /// Number of questions, 1..=20.
    pub count: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct AnswerInput {
    pub question_id: Uuid,
    /// The question text as shown to the user; informational only.
    pub question: Option<String>,
    pub answer: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitAnswersRequest {
    pub answers: Vec<AnswerInput>,
}

#[derive(Serialize, ToSchema)]
pub struct SubmitAnswersResponse {
    pub success: bool,
    pub message: String,
    pub project_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct PrdResponse {
    pub project: ProjectResponse,
    pub status: String,
    pub generated_at: DateTime<Utc>,
}

/// Parses `?count=`; only values in `1..=20` are accepted.
pub fn parse_count(raw: Option<&str>) -> Result<Option<usize>, ApiError> {
    match raw {
        None => Ok(None),
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(count) if (1..=MAX_QUESTION_COUNT).contains(&count) => Ok(Some(count)),
            _ => Err(ApiError::validation_with(
                "Invalid count parameter",
                serde_json::json!({
                    "count": format!("Count must be an integer between 1 and {}", MAX_QUESTION_COUNT)
                }),
            )),
        },
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Generate a new batch of planning questions for the project.
///
/// Questions continue the project's numbering. When the AI provider fails the
/// batch is filled from the template bank, so this only fails on storage errors.
#[utoipa::path(
    post,
    path = "/api/projects/{id}/generate-questions",
    params(("id" = Uuid, Path, description = "Project id"), CountParams),
    responses(
        (status = 200, description = "The generated questions", body = QuestionListResponse),
        (status = 400, description = "Invalid count", body = ErrorBody),
        (status = 404, description = "Project not found", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Planning"
)]
pub async fn generate_questions_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Query(params): Query<CountParams>,
) -> ApiResult<Json<QuestionListResponse>> {
    let count = parse_count(params.count.as_deref())?.unwrap_or(DEFAULT_QUESTION_COUNT);
    let context = "Failed to generate questions";

    // 1. Load the project and what has been asked so far
    let project = state
        .db
        .get_project(project_id)
        .await
        .map_err(|e| ApiError::from_port(context, e))?;
    let existing = state
        .db
        .list_questions(project_id)
        .await
        .map_err(|e| ApiError::from_port(context, e))?;
    let previous: Vec<QuestionAnswer> = existing.iter().map(QuestionAnswer::from).collect();
    let start = state
        .db
        .max_sequence_number(project_id)
        .await
        .map_err(|e| ApiError::from_port(context, e))?
        .map_or(1, |max| max + 1);

    // 2. Generate (never fails, falls back to templates)
    let details = project.details();
    let batch = QuestionBatch {
        count,
        start_sequence_number: start,
        previous: &previous,
        ..QuestionBatch::new(&details)
    };
    let generated = generate_questions(
        state.completion.as_ref(),
        state.credential(),
        state.model(),
        batch,
    )
    .await;

    // 3. Persist the batch
    let inserted = state
        .db
        .insert_questions(project_id, &generated)
        .await
        .map_err(|e| match e {
            PortError::Conflict(message) => ApiError::server("Failed to create questions", message),
            other => ApiError::from_port(context, other),
        })?;

    // 4. Move the project into the planning phase
    if project.status == ProjectStatus::New {
        let update = ProjectUpdate {
            status: Some(ProjectStatus::InProgress),
            ..ProjectUpdate::default()
        };
        if let Err(e) = state.db.update_project(project_id, update).await {
            warn!(project_id = %project_id, error = %e, "Failed to mark project in progress.");
        }
    }

    info!(project_id = %project_id, count = inserted.len(), start, "Stored planning questions.");
    Ok(Json(QuestionListResponse {
        data: inserted.into_iter().map(QuestionResponse::from).collect(),
        project_id,
    }))
}

/// List the project's questions in sequence order.
#[utoipa::path(
    get,
    path = "/api/projects/{id}/planning-questions",
    params(("id" = Uuid, Path, description = "Project id"), CountParams),
    responses(
        (status = 200, description = "Questions ordered by sequence number", body = QuestionListResponse),
        (status = 400, description = "Invalid count", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Planning"
)]
pub async fn list_questions_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    Query(params): Query<CountParams>,
) -> ApiResult<Json<QuestionListResponse>> {
    let count = parse_count(params.count.as_deref())?;
    let mut questions = state
        .db
        .list_questions(project_id)
        .await
        .map_err(|e| ApiError::from_port("Failed to fetch questions", e))?;
    if let Some(count) = count {
        questions.truncate(count);
    }

    Ok(Json(QuestionListResponse {
        data: questions.into_iter().map(QuestionResponse::from).collect(),
        project_id,
    }))
}

/// Save answers. Later entries for the same question overwrite earlier ones;
/// ids that do not belong to the project are skipped.
#[utoipa::path(
    post,
    path = "/api/projects/{id}/planning-questions",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = SubmitAnswersRequest,
    responses(
        (status = 200, description = "Answers saved", body = SubmitAnswersResponse),
        (status = 400, description = "Invalid request body", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Planning"
)]
pub async fn submit_answers_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    payload: Result<Json<SubmitAnswersRequest>, JsonRejection>,
) -> ApiResult<Json<SubmitAnswersResponse>> {
    let req = json_payload(payload)?;
    if req.answers.is_empty() {
        return Err(ApiError::validation("No answers provided"));
    }

    let mut saved = 0usize;
    for input in &req.answers {
        let updated = state
            .db
            .update_answer(project_id, input.question_id, &input.answer)
            .await
            .map_err(|e| ApiError::from_port("Failed to save answers", e))?;
        if updated {
            saved += 1;
        } else {
            warn!(project_id = %project_id, question_id = %input.question_id, "Ignoring answer for unknown question.");
        }
    }

    Ok(Json(SubmitAnswersResponse {
        success: true,
        message: format!("Saved {} answers", saved),
        project_id,
    }))
}

/// Generate the PRD from the answered questions and mark the project finished.
#[utoipa::path(
    post,
    path = "/api/projects/{id}/generate-prd",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "PRD generated", body = PrdResponse),
        (status = 404, description = "Project not found", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 500, description = "Generation failed", body = ErrorBody)
    ),
    tag = "Planning"
)]
pub async fn generate_prd_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<PrdResponse>> {
    let context = "Failed to generate PRD";
    let project = generate_and_store_prd(
        state.db.as_ref(),
        state.completion.as_ref(),
        state.credential(),
        state.model(),
        project_id,
    )
    .await
    .map_err(|e| match e {
        PrdError::Port(PortError::NotFound(_)) => ApiError::NotFound("Project not found".to_string()),
        PrdError::Port(other) => ApiError::from_port(context, other),
        PrdError::Generation(source) => {
            error!(project_id = %project_id, error = %source, "PRD generation failed.");
            ApiError::Generation { context, source }
        }
    })?;

    info!(project_id = %project_id, "Project finished with a generated PRD.");
    Ok(Json(PrdResponse {
        project: project.into(),
        status: "success".to_string(),
        generated_at: Utc::now(),
    }))
}
