//! crates/planning_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or HTTP framework.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// Represents a user - used throughout app
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Lifecycle of a planning project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    New,
    InProgress,
    Finished,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::New => "new",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Finished => "finished",
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ProjectStatus::New),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "finished" => Ok(ProjectStatus::Finished),
            other => Err(format!("unknown project status '{}'", other)),
        }
    }
}

/// A planning project owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub main_problem: Option<String>,
    pub min_feature_set: Option<String>,
    pub out_of_scope: Option<String>,
    pub success_criteria: Option<String>,
    pub status: ProjectStatus,
    pub prd: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// The descriptive fields used to build prompts.
    pub fn details(&self) -> ProjectDetails {
        ProjectDetails {
            name: self.name.clone(),
            description: self.description.clone(),
            main_problem: self.main_problem.clone(),
            min_feature_set: self.min_feature_set.clone(),
            out_of_scope: self.out_of_scope.clone(),
            success_criteria: self.success_criteria.clone(),
        }
    }
}

/// The descriptive part of a project, as seen by the generation engines.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectDetails {
    pub name: String,
    pub description: Option<String>,
    pub main_problem: Option<String>,
    pub min_feature_set: Option<String>,
    pub out_of_scope: Option<String>,
    pub success_criteria: Option<String>,
}

/// A planning question attached to a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Question {
    pub id: Uuid,
    pub project_id: Uuid,
    pub question: String,
    pub answer: Option<String>,
    pub sequence_number: i32,
    pub created_at: DateTime<Utc>,
}

/// A question produced by the generation engine, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedQuestion {
    pub question: String,
    pub sequence_number: i32,
}

/// A previously asked question and its answer, if one was given.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: Option<String>,
}

impl From<&Question> for QuestionAnswer {
    fn from(q: &Question) -> Self {
        Self {
            question: q.question.clone(),
            answer: q.answer.clone(),
        }
    }
}

/// Fields accepted when creating a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub main_problem: Option<String>,
    pub min_feature_set: Option<String>,
    pub out_of_scope: Option<String>,
    pub success_criteria: Option<String>,
}

/// A partial update. `None` leaves a field untouched; `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub main_problem: Option<Option<String>>,
    pub min_feature_set: Option<Option<String>>,
    pub out_of_scope: Option<Option<String>>,
    pub success_criteria: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Name,
    CreatedAt,
    UpdatedAt,
    Status,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::CreatedAt => "created_at",
            SortField::UpdatedAt => "updated_at",
            SortField::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Filtering, sorting and pagination for the project list.
#[derive(Debug, Clone)]
pub struct ProjectQuery {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub status: Option<ProjectStatus>,
    pub sort: SortField,
    pub order: SortOrder,
}

impl Default for ProjectQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: None,
            status: None,
            sort: SortField::CreatedAt,
            order: SortOrder::Desc,
        }
    }
}

impl ProjectQuery {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of projects plus the total number of matches.
#[derive(Debug, Clone)]
pub struct ProjectPage {
    pub projects: Vec<Project>,
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_its_wire_name() {
        for status in [ProjectStatus::New, ProjectStatus::InProgress, ProjectStatus::Finished] {
            assert_eq!(status.as_str().parse::<ProjectStatus>(), Ok(status));
        }
        assert!("done".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn offset_starts_at_zero_for_first_page() {
        let mut query = ProjectQuery::default();
        assert_eq!(query.offset(), 0);
        query.page = 3;
        query.limit = 25;
        assert_eq!(query.offset(), 50);
    }
}
