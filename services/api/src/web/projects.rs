//! services/api/src/web/projects.rs
//!
//! CRUD handlers for planning projects. Ownership of `{id}` routes is already
//! enforced by the session guard, so these handlers only validate input.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use planning_core::domain::{
    NewProject, Project, ProjectQuery, ProjectStatus, ProjectUpdate, SortField, SortOrder,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, ErrorBody};
use crate::web::json_payload;
use crate::web::state::{AppState, CurrentUser};

const MAX_NAME_LENGTH: usize = 255;
const MAX_PAGE_SIZE: u32 = 100;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct ProjectResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub main_problem: Option<String>,
    pub min_feature_set: Option<String>,
    pub out_of_scope: Option<String>,
    pub success_criteria: Option<String>,
    /// One of `new`, `in_progress`, `finished`.
    pub status: String,
    pub prd: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Project> for ProjectResponse {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            name: p.name,
            description: p.description,
            main_problem: p.main_problem,
            min_feature_set: p.min_feature_set,
            out_of_scope: p.out_of_scope,
            success_criteria: p.success_criteria,
            status: p.status.as_str().to_string(),
            prd: p.prd,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct Pagination {
    pub total_count: u64,
    pub page_count: u64,
    pub current_page: u32,
    pub per_page: u32,
}

#[derive(Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub data: Vec<ProjectResponse>,
    pub pagination: Pagination,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteProjectResponse {
    pub success: bool,
    pub message: String,
}

/// Raw list parameters; parsed by hand so bad values produce a 400 envelope.
#[derive(Deserialize, IntoParams, Default)]
#[into_params(parameter_in = Query)]
pub struct ListProjectsParams {
    /// 1-based page number, default 1.
    pub page: Option<String>,
    /// Page size 1..=100, default 10.
    pub limit: Option<String>,
    /// Case-insensitive substring of the project name.
    pub search: Option<String>,
    pub status: Option<String>,
    /// `name`, `created_at`, `updated_at` or `status`.
    pub sort: Option<String>,
    /// `asc` or `desc`.
    pub order: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    pub main_problem: Option<String>,
    pub min_feature_set: Option<String>,
    pub out_of_scope: Option<String>,
    pub success_criteria: Option<String>,
}

/// Absent fields are left untouched; `null` clears a nullable field.
#[derive(Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub main_problem: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub min_feature_set: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub out_of_scope: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>)]
    pub success_criteria: Option<Option<String>>,
    pub status: Option<String>,
}

/// Distinguishes an explicit `null` from a missing field.
fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

//=========================================================================================
// Validation
//=========================================================================================

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn check_name(name: &str, details: &mut Map<String, Value>) {
    let length = name.trim().chars().count();
    if length == 0 {
        details.insert("name".into(), json!("Project name is required"));
    } else if length > MAX_NAME_LENGTH {
        details.insert(
            "name".into(),
            json!(format!("Project name must be at most {} characters", MAX_NAME_LENGTH)),
        );
    }
}

fn finish(error: &str, details: Map<String, Value>) -> Result<(), ApiError> {
    if details.is_empty() {
        Ok(())
    } else {
        Err(ApiError::validation_with(error, Value::Object(details)))
    }
}

pub fn parse_list_params(params: ListProjectsParams) -> Result<ProjectQuery, ApiError> {
    let mut query = ProjectQuery::default();
    let mut details = Map::new();

    if let Some(page) = params.page {
        match page.trim().parse::<u32>() {
            Ok(page) if page >= 1 => query.page = page,
            _ => {
                details.insert("page".into(), json!("Page must be a positive integer"));
            }
        }
    }
    if let Some(limit) = params.limit {
        match limit.trim().parse::<u32>() {
            Ok(limit) if (1..=MAX_PAGE_SIZE).contains(&limit) => query.limit = limit,
            _ => {
                details.insert(
                    "limit".into(),
                    json!(format!("Limit must be between 1 and {}", MAX_PAGE_SIZE)),
                );
            }
        }
    }
    if let Some(status) = params.status.filter(|s| !s.is_empty()) {
        match status.parse::<ProjectStatus>() {
            Ok(status) => query.status = Some(status),
            Err(e) => {
                details.insert("status".into(), json!(e));
            }
        }
    }
    if let Some(sort) = params.sort {
        query.sort = match sort.as_str() {
            "name" => SortField::Name,
            "created_at" => SortField::CreatedAt,
            "updated_at" => SortField::UpdatedAt,
            "status" => SortField::Status,
            _ => {
                details.insert(
                    "sort".into(),
                    json!("Sort must be one of name, created_at, updated_at, status"),
                );
                query.sort
            }
        };
    }
    if let Some(order) = params.order {
        query.order = match order.to_ascii_lowercase().as_str() {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            _ => {
                details.insert("order".into(), json!("Order must be asc or desc"));
                query.order
            }
        };
    }
    query.search = blank_to_none(params.search.map(|s| s.trim().to_string()));

    finish("Invalid query parameters", details)?;
    Ok(query)
}

fn parse_create(req: CreateProjectRequest) -> Result<NewProject, ApiError> {
    let mut details = Map::new();
    check_name(&req.name, &mut details);
    finish("Invalid project data", details)?;

    Ok(NewProject {
        name: req.name.trim().to_string(),
        description: blank_to_none(req.description),
        main_problem: blank_to_none(req.main_problem),
        min_feature_set: blank_to_none(req.min_feature_set),
        out_of_scope: blank_to_none(req.out_of_scope),
        success_criteria: blank_to_none(req.success_criteria),
    })
}

fn parse_update(req: UpdateProjectRequest) -> Result<ProjectUpdate, ApiError> {
    let mut details = Map::new();
    if let Some(name) = &req.name {
        check_name(name, &mut details);
    }
    let status = match req.status.as_deref().map(str::parse::<ProjectStatus>) {
        None => None,
        Some(Ok(status)) => Some(status),
        Some(Err(e)) => {
            details.insert("status".into(), json!(e));
            None
        }
    };
    finish("Invalid project data", details)?;

    Ok(ProjectUpdate {
        name: req.name.map(|n| n.trim().to_string()),
        description: req.description,
        main_problem: req.main_problem,
        min_feature_set: req.min_feature_set,
        out_of_scope: req.out_of_scope,
        success_criteria: req.success_criteria,
        status,
    })
}

fn page_count(total: u64, per_page: u32) -> u64 {
    total.div_ceil(u64::from(per_page.max(1)))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List the caller's projects.
#[utoipa::path(
    get,
    path = "/api/projects",
    params(ListProjectsParams),
    responses(
        (status = 200, description = "One page of projects", body = ProjectListResponse),
        (status = 400, description = "Invalid query parameters", body = ErrorBody),
        (status = 401, description = "Authentication required", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Projects"
)]
pub async fn list_projects_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<ListProjectsParams>,
) -> ApiResult<Json<ProjectListResponse>> {
    let query = parse_list_params(params)?;
    let page = state
        .db
        .list_projects(user.id(), &query)
        .await
        .map_err(|e| ApiError::from_port("Failed to fetch projects", e))?;

    Ok(Json(ProjectListResponse {
        pagination: Pagination {
            total_count: page.total_count,
            page_count: page_count(page.total_count, query.limit),
            current_page: query.page,
            per_page: query.limit,
        },
        data: page.projects.into_iter().map(ProjectResponse::from).collect(),
    }))
}

/// Create a project owned by the caller.
#[utoipa::path(
    post,
    path = "/api/projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Invalid project data", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    tag = "Projects"
)]
pub async fn create_project_handler(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let project = parse_create(json_payload(payload)?)?;
    let project = state
        .db
        .create_project(user.id(), project)
        .await
        .map_err(|e| ApiError::from_port("Failed to create project", e))?;

    info!(project_id = %project.id, user_id = %user.id(), "Created project.");
    Ok((StatusCode::CREATED, Json(ProjectResponse::from(project))))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "The project", body = ProjectResponse),
        (status = 400, description = "Invalid project id", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Project not found", body = ErrorBody)
    ),
    tag = "Projects"
)]
pub async fn get_project_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectResponse>> {
    let project = state
        .db
        .get_project(project_id)
        .await
        .map_err(|e| ApiError::from_port("Failed to fetch project", e))?;
    Ok(Json(project.into()))
}

/// Partially update a project.
#[utoipa::path(
    put,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "The updated project", body = ProjectResponse),
        (status = 400, description = "Invalid project data", body = ErrorBody),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Project not found", body = ErrorBody)
    ),
    tag = "Projects"
)]
pub async fn update_project_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
    payload: Result<Json<UpdateProjectRequest>, JsonRejection>,
) -> ApiResult<Json<ProjectResponse>> {
    let update = parse_update(json_payload(payload)?)?;
    let project = state
        .db
        .update_project(project_id, update)
        .await
        .map_err(|e| ApiError::from_port("Failed to update project", e))?;
    Ok(Json(project.into()))
}

/// Delete a project together with its questions.
#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project deleted", body = DeleteProjectResponse),
        (status = 403, description = "Not the owner", body = ErrorBody),
        (status = 404, description = "Project not found", body = ErrorBody)
    ),
    tag = "Projects"
)]
pub async fn delete_project_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<DeleteProjectResponse>> {
    state
        .db
        .delete_project(project_id)
        .await
        .map_err(|e| ApiError::from_port("Failed to delete project", e))?;

    info!(project_id = %project_id, "Deleted project.");
    Ok(Json(DeleteProjectResponse {
        success: true,
        message: "Project deleted successfully".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListProjectsParams {
        let mut p = ListProjectsParams::default();
        for (k, v) in pairs {
            let v = Some(v.to_string());
            match *k {
                "page" => p.page = v,
                "limit" => p.limit = v,
                "search" => p.search = v,
                "status" => p.status = v,
                "sort" => p.sort = v,
                "order" => p.order = v,
                _ => unreachable!(),
            }
        }
        p
    }

    #[test]
    fn list_defaults() {
        let query = parse_list_params(ListProjectsParams::default()).unwrap();
        assert_eq!((query.page, query.limit), (1, 10));
        assert_eq!(query.sort, SortField::CreatedAt);
        assert_eq!(query.order, SortOrder::Desc);
        assert_eq!(query.search, None);
    }

    #[test]
    fn list_params_are_parsed() {
        let query = parse_list_params(params(&[
            ("page", "3"),
            ("limit", "25"),
            ("search", " todo "),
            ("status", "in_progress"),
            ("sort", "name"),
            ("order", "ASC"),
        ]))
        .unwrap();
        assert_eq!((query.page, query.limit, query.offset()), (3, 25, 50));
        assert_eq!(query.search.as_deref(), Some("todo"));
        assert_eq!(query.status, Some(ProjectStatus::InProgress));
        assert_eq!(query.sort, SortField::Name);
        assert_eq!(query.order, SortOrder::Asc);
    }

    #[test]
    fn bad_list_params_are_all_reported() {
        let err = parse_list_params(params(&[
            ("page", "0"),
            ("limit", "101"),
            ("sort", "owner"),
            ("order", "sideways"),
            ("status", "archived"),
        ]))
        .unwrap_err();
        match err {
            ApiError::Validation { details: Some(details), .. } => {
                for field in ["page", "limit", "sort", "order", "status"] {
                    assert!(details.get(field).is_some(), "missing detail for {}", field);
                }
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn project_names_are_bounded() {
        let create = |name: String| CreateProjectRequest {
            name,
            description: Some("  ".to_string()),
            main_problem: None,
            min_feature_set: None,
            out_of_scope: None,
            success_criteria: None,
        };
        assert!(parse_create(create(String::new())).is_err());
        assert!(parse_create(create("x".repeat(256))).is_err());

        let project = parse_create(create(" Todo App ".to_string())).unwrap();
        assert_eq!(project.name, "Todo App");
        assert_eq!(project.description, None);
    }

    #[test]
    fn update_distinguishes_null_from_missing() {
        let req: UpdateProjectRequest =
            serde_json::from_value(json!({"description": null, "status": "finished"})).unwrap();
        let update = parse_update(req).unwrap();
        assert_eq!(update.description, Some(None));
        assert_eq!(update.main_problem, None);
        assert_eq!(update.status, Some(ProjectStatus::Finished));
    }

    #[test]
    fn page_count_rounds_up() {
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
    }
}
