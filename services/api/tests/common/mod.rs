//! Shared fixtures for the HTTP integration tests: an in-memory database,
//! a scripted model and helpers that drive the full router.
#![allow(dead_code)]

use api_lib::config::Config;
use api_lib::web::{self, state::AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use http_body_util::BodyExt;
use planning_core::completion::{
    CompletionError, CompletionRequest, CompletionResult, CompletionService, ResponseFormat,
    TextStream, Usage,
};
use planning_core::domain::{
    AuthSession, GeneratedQuestion, NewProject, Project, ProjectPage, ProjectQuery,
    ProjectStatus, ProjectUpdate, Question, SortField, SortOrder, User, UserCredentials,
};
use planning_core::ports::{DatabaseService, PortError, PortResult};
use planning_core::rate_limit::{InMemoryRateLimitStore, RateLimitConfig, RateLimiter};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use uuid::Uuid;

//=========================================================================================
// In-memory DatabaseService
//=========================================================================================

#[derive(Default)]
struct Tables {
    users: Vec<UserCredentials>,
    sessions: HashMap<String, AuthSession>,
    projects: HashMap<Uuid, Project>,
    questions: Vec<Question>,
}

#[derive(Default)]
pub struct MemoryDb {
    tables: Mutex<Tables>,
    pub fail_session_lookup: AtomicBool,
    pub fail_owner_lookup: AtomicBool,
    /// Reports no existing questions, as a concurrent reader would before another insert lands.
    pub stale_max_sequence: AtomicBool,
}

impl MemoryDb {
    /// Creates a user with a live session and returns it with its cookie value.
    pub async fn seed_user(&self, email: &str) -> (User, String) {
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Test User".to_string(),
            created_at: Utc::now(),
        };
        let token = Uuid::new_v4().to_string();
        let mut tables = self.tables.lock().await;
        tables.users.push(UserCredentials {
            user: user.clone(),
            hashed_password: String::new(),
        });
        tables.sessions.insert(
            token.clone(),
            AuthSession {
                token: token.clone(),
                user_id: user.id,
                expires_at: Utc::now() + Duration::days(1),
            },
        );
        (user, format!("session={}", token))
    }

    pub async fn expire_sessions(&self) {
        let mut tables = self.tables.lock().await;
        for session in tables.sessions.values_mut() {
            session.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    pub async fn project(&self, id: Uuid) -> Option<Project> {
        self.tables.lock().await.projects.get(&id).cloned()
    }

    pub async fn questions(&self, project_id: Uuid) -> Vec<Question> {
        let mut questions: Vec<Question> = self
            .tables
            .lock()
            .await
            .questions
            .iter()
            .filter(|q| q.project_id == project_id)
            .cloned()
            .collect();
        questions.sort_by_key(|q| q.sequence_number);
        questions
    }

    pub async fn session_count(&self) -> usize {
        self.tables.lock().await.sessions.len()
    }
}

fn missing_project(id: Uuid) -> PortError {
    PortError::NotFound(format!("Project {} not found", id))
}

#[async_trait]
impl DatabaseService for MemoryDb {
    async fn create_user(&self, email: &str, name: &str, hashed_password: &str) -> PortResult<User> {
        let mut tables = self.tables.lock().await;
        if tables.users.iter().any(|c| c.user.email == email) {
            return Err(PortError::Conflict("User with this email already exists".to_string()));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        tables.users.push(UserCredentials {
            user: user.clone(),
            hashed_password: hashed_password.to_string(),
        });
        Ok(user)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        self.tables
            .lock()
            .await
            .users
            .iter()
            .find(|c| c.user.email == email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))
    }

    async fn create_auth_session(&self, session: AuthSession) -> PortResult<()> {
        self.tables.lock().await.sessions.insert(session.token.clone(), session);
        Ok(())
    }

    async fn find_user_by_session(&self, token: &str, now: DateTime<Utc>) -> PortResult<Option<User>> {
        if self.fail_session_lookup.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("session store offline".to_string()));
        }
        let tables = self.tables.lock().await;
        let Some(session) = tables.sessions.get(token).filter(|s| s.expires_at > now) else {
            return Ok(None);
        };
        Ok(tables
            .users
            .iter()
            .find(|c| c.user.id == session.user_id)
            .map(|c| c.user.clone()))
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        self.tables.lock().await.sessions.remove(token);
        Ok(())
    }

    async fn get_project_owner(&self, project_id: Uuid) -> PortResult<Option<Uuid>> {
        if self.fail_owner_lookup.load(Ordering::SeqCst) {
            return Err(PortError::Unexpected("projects table offline".to_string()));
        }
        Ok(self.tables.lock().await.projects.get(&project_id).map(|p| p.user_id))
    }

    async fn list_projects(&self, user_id: Uuid, query: &ProjectQuery) -> PortResult<ProjectPage> {
        let tables = self.tables.lock().await;
        let needle = query.search.as_ref().map(|s| s.to_lowercase());
        let mut matching: Vec<Project> = tables
            .projects
            .values()
            .filter(|p| p.user_id == user_id)
            .filter(|p| needle.as_ref().map_or(true, |n| p.name.to_lowercase().contains(n)))
            .filter(|p| query.status.map_or(true, |s| p.status == s))
            .cloned()
            .collect();

        matching.sort_by(|a, b| match query.sort {
            SortField::Name => a.name.cmp(&b.name),
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
        });
        if query.order == SortOrder::Desc {
            matching.reverse();
        }

        let total_count = matching.len() as u64;
        let projects = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .collect();
        Ok(ProjectPage { projects, total_count })
    }

    async fn create_project(&self, user_id: Uuid, project: NewProject) -> PortResult<Project> {
        let mut tables = self.tables.lock().await;
        // Strictly increasing timestamps keep the default sort deterministic.
        let now = Utc::now() + Duration::milliseconds(tables.projects.len() as i64);
        let project = Project {
            id: Uuid::new_v4(),
            user_id,
            name: project.name,
            description: project.description,
            main_problem: project.main_problem,
            min_feature_set: project.min_feature_set,
            out_of_scope: project.out_of_scope,
            success_criteria: project.success_criteria,
            status: ProjectStatus::New,
            prd: None,
            created_at: now,
            updated_at: now,
        };
        tables.projects.insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_project(&self, project_id: Uuid) -> PortResult<Project> {
        self.project(project_id).await.ok_or_else(|| missing_project(project_id))
    }

    async fn update_project(&self, project_id: Uuid, update: ProjectUpdate) -> PortResult<Project> {
        let mut tables = self.tables.lock().await;
        let project = tables
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| missing_project(project_id))?;
        if let Some(name) = update.name {
            project.name = name;
        }
        if let Some(v) = update.description {
            project.description = v;
        }
        if let Some(v) = update.main_problem {
            project.main_problem = v;
        }
        if let Some(v) = update.min_feature_set {
            project.min_feature_set = v;
        }
        if let Some(v) = update.out_of_scope {
            project.out_of_scope = v;
        }
        if let Some(v) = update.success_criteria {
            project.success_criteria = v;
        }
        if let Some(status) = update.status {
            project.status = status;
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn delete_project(&self, project_id: Uuid) -> PortResult<()> {
        let mut tables = self.tables.lock().await;
        tables
            .projects
            .remove(&project_id)
            .ok_or_else(|| missing_project(project_id))?;
        tables.questions.retain(|q| q.project_id != project_id);
        Ok(())
    }

    async fn store_prd(&self, project_id: Uuid, prd: &str) -> PortResult<Project> {
        let mut tables = self.tables.lock().await;
        let project = tables
            .projects
            .get_mut(&project_id)
            .ok_or_else(|| missing_project(project_id))?;
        project.prd = Some(prd.to_string());
        project.status = ProjectStatus::Finished;
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn list_questions(&self, project_id: Uuid) -> PortResult<Vec<Question>> {
        Ok(self.questions(project_id).await)
    }

    async fn max_sequence_number(&self, project_id: Uuid) -> PortResult<Option<i32>> {
        if self.stale_max_sequence.load(Ordering::SeqCst) {
            return Ok(None);
        }
        Ok(self
            .tables
            .lock()
            .await
            .questions
            .iter()
            .filter(|q| q.project_id == project_id)
            .map(|q| q.sequence_number)
            .max())
    }

    async fn insert_questions(
        &self,
        project_id: Uuid,
        questions: &[GeneratedQuestion],
    ) -> PortResult<Vec<Question>> {
        let mut tables = self.tables.lock().await;
        let taken = |seq: i32, tables: &Tables| {
            tables
                .questions
                .iter()
                .any(|q| q.project_id == project_id && q.sequence_number == seq)
        };
        if questions.iter().any(|q| taken(q.sequence_number, &*tables)) {
            return Err(PortError::Conflict("duplicate sequence number".to_string()));
        }

        let inserted: Vec<Question> = questions
            .iter()
            .map(|q| Question {
                id: Uuid::new_v4(),
                project_id,
                question: q.question.clone(),
                answer: None,
                sequence_number: q.sequence_number,
                created_at: Utc::now(),
            })
            .collect();
        tables.questions.extend(inserted.iter().cloned());
        Ok(inserted)
    }

    async fn update_answer(&self, project_id: Uuid, question_id: Uuid, answer: &str) -> PortResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables
            .questions
            .iter_mut()
            .find(|q| q.id == question_id && q.project_id == project_id)
        {
            Some(question) => {
                question.answer = Some(answer.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

//=========================================================================================
// Scripted CompletionService
//=========================================================================================

/// Answers question requests with numbered questions and PRD requests with a
/// fixed document, unless told to fail.
#[derive(Default)]
pub struct ScriptedModel {
    pub fail_questions: AtomicBool,
    pub fail_prd: AtomicBool,
    pub calls: AtomicUsize,
}

pub const PRD_DOCUMENT: &str = "### Decisions\n1. Build a web app\n\n### Matched Recommendations\n1. Keep it small\n\n### PRD Planning Summary\nA todo app.\n\n### Unresolved Issues\nNone";

impl ScriptedModel {
    pub fn failing() -> Self {
        let model = Self::default();
        model.fail_questions.store(true, Ordering::SeqCst);
        model.fail_prd.store(true, Ordering::SeqCst);
        model
    }
}

#[async_trait]
impl CompletionService for ScriptedModel {
    async fn complete(
        &self,
        credential: Option<&str>,
        request: CompletionRequest,
    ) -> Result<CompletionResult, CompletionError> {
        request.preflight(credential)?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        let Some(ResponseFormat::JsonSchema { name, schema, .. }) = &request.response_format else {
            return Err(CompletionError::Validation("expected a json schema".to_string()));
        };

        let content = match name.as_str() {
            "questions" => {
                if self.fail_questions.load(Ordering::SeqCst) {
                    return Err(CompletionError::Timeout { after: std::time::Duration::from_millis(10) });
                }
                let count = schema["maxItems"].as_u64().unwrap_or(0);
                let questions: Vec<String> = (1..=count)
                    .map(|i| format!("AI question {} of call {}?", i, call))
                    .collect();
                serde_json::to_string(&questions).unwrap()
            }
            _ => {
                if self.fail_prd.load(Ordering::SeqCst) {
                    return Err(CompletionError::Provider {
                        status: 503,
                        message: "upstream unavailable".to_string(),
                        error_type: None,
                        param: None,
                        code: None,
                    });
                }
                serde_json::to_string(PRD_DOCUMENT).unwrap()
            }
        };

        Ok(CompletionResult {
            id: format!("gen-{}", call),
            model: request.model.clone(),
            content,
            usage: Usage::default(),
        })
    }

    async fn complete_streaming(
        &self,
        _credential: Option<&str>,
        _request: CompletionRequest,
        _cancel: CancellationToken,
    ) -> Result<TextStream, CompletionError> {
        Err(CompletionError::Configuration("streaming is not scripted".to_string()))
    }
}

//=========================================================================================
// Test Application
//=========================================================================================

pub fn test_config(rate_limit_requests: u32) -> Config {
    let vars: HashMap<&str, String> = HashMap::from([
        ("DATABASE_URL", "postgres://unused".to_string()),
        ("OPEN_ROUTER_KEY", "test-key".to_string()),
        ("SECURE_COOKIES", "false".to_string()),
        ("RATE_LIMIT_REQUESTS", rate_limit_requests.to_string()),
    ]);
    Config::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

pub struct TestApp {
    pub router: Router,
    pub db: Arc<MemoryDb>,
    pub model: Arc<ScriptedModel>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(ScriptedModel::default(), 100)
    }

    pub fn build(model: ScriptedModel, rate_limit_requests: u32) -> Self {
        let config = Arc::new(test_config(rate_limit_requests));
        let db = Arc::new(MemoryDb::default());
        let model = Arc::new(model);
        let limiter = RateLimiter::new(
            RateLimitConfig::generation_endpoints(config.rate_limit_requests, config.rate_limit_window)
                .unwrap(),
            Arc::new(InMemoryRateLimitStore::new()),
        );
        let state = Arc::new(AppState {
            db: db.clone(),
            completion: model.clone(),
            rate_limiter: Arc::new(limiter),
            config,
        });
        Self { router: web::router(state), db, model }
    }

    pub async fn send(&self, method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        TestResponse { status, headers, body }
    }

    pub async fn get(&self, uri: &str, cookie: &str) -> TestResponse {
        self.send(Method::GET, uri, Some(cookie), None).await
    }

    pub async fn post(&self, uri: &str, cookie: &str, body: Value) -> TestResponse {
        self.send(Method::POST, uri, Some(cookie), Some(body)).await
    }

    /// Creates a project through the API and returns its id.
    pub async fn create_project(&self, cookie: &str, name: &str) -> Uuid {
        let response = self
            .post("/api/projects", cookie, serde_json::json!({ "name": name }))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["id"].as_str().unwrap().parse().unwrap()
    }
}
