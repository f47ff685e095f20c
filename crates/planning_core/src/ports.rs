//! crates/planning_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    AuthSession, GeneratedQuestion, NewProject, Project, ProjectPage, ProjectQuery,
    ProjectUpdate, Question, User, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Users & Auth ---
    /// Fails with `Conflict` when the email is already registered.
    async fn create_user(&self, email: &str, name: &str, hashed_password: &str) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(&self, session: AuthSession) -> PortResult<()>;

    /// `Ok(None)` means "no live session"; `Err` means the lookup itself failed.
    async fn find_user_by_session(&self, token: &str, now: DateTime<Utc>) -> PortResult<Option<User>>;

    async fn delete_auth_session(&self, token: &str) -> PortResult<()>;

    // --- Projects ---
    /// Owner of a project, `Ok(None)` if it does not exist.
    async fn get_project_owner(&self, project_id: Uuid) -> PortResult<Option<Uuid>>;

    async fn list_projects(&self, user_id: Uuid, query: &ProjectQuery) -> PortResult<ProjectPage>;

    async fn create_project(&self, user_id: Uuid, project: NewProject) -> PortResult<Project>;

    async fn get_project(&self, project_id: Uuid) -> PortResult<Project>;

    async fn update_project(&self, project_id: Uuid, update: ProjectUpdate) -> PortResult<Project>;

    async fn delete_project(&self, project_id: Uuid) -> PortResult<()>;

    /// Writes the document and marks the project finished in one update.
    async fn store_prd(&self, project_id: Uuid, prd: &str) -> PortResult<Project>;

    // --- Questions ---
    /// Questions of a project ordered by sequence number.
    async fn list_questions(&self, project_id: Uuid) -> PortResult<Vec<Question>>;

    async fn max_sequence_number(&self, project_id: Uuid) -> PortResult<Option<i32>>;

    async fn insert_questions(
        &self,
        project_id: Uuid,
        questions: &[GeneratedQuestion],
    ) -> PortResult<Vec<Question>>;

    /// Sets the answer of a question if it belongs to the project.
    /// Returns whether a row was updated.
    async fn update_answer(&self, project_id: Uuid, question_id: Uuid, answer: &str) -> PortResult<bool>;
}

/// The state of one rate-limit key after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: DateTime<Utc>,
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically starts a fresh window when the key is unknown or `now > reset_at`,
    /// increments the counter and returns the post-increment entry.
    async fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> PortResult<RateLimitEntry>;
}
