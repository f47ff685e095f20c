//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use planning_core::domain::{
    AuthSession, GeneratedQuestion, NewProject, Project, ProjectPage, ProjectQuery,
    ProjectStatus, ProjectUpdate, Question, SortOrder, User, UserCredentials,
};
use planning_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const PROJECT_COLUMNS: &str = "id, user_id, name, description, main_problem, min_feature_set, \
     out_of_scope, success_criteria, status, prd, created_at, updated_at";

const QUESTION_COLUMNS: &str = "id, project_id, question, answer, sequence_number, created_at";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

/// Escapes `LIKE` wildcards so a search term only matches literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    email: String,
    name: String,
    created_at: DateTime<Utc>,
    hashed_password: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user: User {
                id: self.id,
                email: self.email,
                name: self.name,
                created_at: self.created_at,
            },
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ProjectRecord {
    id: Uuid,
    user_id: Uuid,
    name: String,
    description: Option<String>,
    main_problem: Option<String>,
    min_feature_set: Option<String>,
    out_of_scope: Option<String>,
    success_criteria: Option<String>,
    status: String,
    prd: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ProjectRecord {
    fn to_domain(self) -> PortResult<Project> {
        let status = self.status.parse::<ProjectStatus>().map_err(PortError::Unexpected)?;
        Ok(Project {
            id: self.id,
            user_id: self.user_id,
            name: self.name,
            description: self.description,
            main_problem: self.main_problem,
            min_feature_set: self.min_feature_set,
            out_of_scope: self.out_of_scope,
            success_criteria: self.success_criteria,
            status,
            prd: self.prd,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct QuestionRecord {
    id: Uuid,
    project_id: Uuid,
    question: String,
    answer: Option<String>,
    sequence_number: i32,
    created_at: DateTime<Utc>,
}
impl QuestionRecord {
    fn to_domain(self) -> Question {
        Question {
            id: self.id,
            project_id: self.project_id,
            question: self.question,
            answer: self.answer,
            sequence_number: self.sequence_number,
            created_at: self.created_at,
        }
    }
}

fn push_project_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, user_id: Uuid, query: &ProjectQuery) {
    builder.push(" WHERE user_id = ").push_bind(user_id);
    if let Some(search) = query.search.as_deref().filter(|s| !s.is_empty()) {
        builder.push(" AND name ILIKE ").push_bind(like_pattern(search));
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(&self, email: &str, name: &str, hashed_password: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, email, name, hashed_password) VALUES ($1, $2, $3, $4) \
             RETURNING id, email, name, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(name)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PortError::Conflict("User with this email already exists".to_string())
            } else {
                unexpected(e)
            }
        })?;

        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, email, name, created_at, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", email)))?;

        Ok(record.to_domain())
    }

    async fn create_auth_session(&self, session: AuthSession) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.token)
            .bind(session.user_id)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn find_user_by_session(&self, token: &str, now: DateTime<Utc>) -> PortResult<Option<User>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.email, u.name, u.created_at \
             FROM auth_sessions s JOIN users u ON u.id = s.user_id \
             WHERE s.token = $1 AND s.expires_at > $2",
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(UserRecord::to_domain))
    }

    async fn delete_auth_session(&self, token: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_project_owner(&self, project_id: Uuid) -> PortResult<Option<Uuid>> {
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn list_projects(&self, user_id: Uuid, query: &ProjectQuery) -> PortResult<ProjectPage> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM projects");
        push_project_filters(&mut count, user_id, query);
        let total_count: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {} FROM projects", PROJECT_COLUMNS));
        push_project_filters(&mut select, user_id, query);
        // The column comes from a closed enum, never from user input.
        let direction = match query.order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        select.push(format!(" ORDER BY {} {}, id {}", query.sort.column(), direction, direction));
        select.push(" LIMIT ").push_bind(i64::from(query.limit));
        select.push(" OFFSET ").push_bind(query.offset() as i64);

        let records: Vec<ProjectRecord> = select
            .build_query_as::<ProjectRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(ProjectPage {
            projects: records
                .into_iter()
                .map(ProjectRecord::to_domain)
                .collect::<PortResult<_>>()?,
            total_count: total_count.max(0) as u64,
        })
    }

    async fn create_project(&self, user_id: Uuid, project: NewProject) -> PortResult<Project> {
        let record = sqlx::query_as::<_, ProjectRecord>(&format!(
            "INSERT INTO projects (id, user_id, name, description, main_problem, min_feature_set, \
             out_of_scope, success_criteria, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'new') RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.main_problem)
        .bind(&project.min_feature_set)
        .bind(&project.out_of_scope)
        .bind(&project.success_criteria)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        record.to_domain()
    }

    async fn get_project(&self, project_id: Uuid) -> PortResult<Project> {
        sqlx::query_as::<_, ProjectRecord>(&format!(
            "SELECT {} FROM projects WHERE id = $1",
            PROJECT_COLUMNS
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Project {} not found", project_id)))?
        .to_domain()
    }

    async fn update_project(&self, project_id: Uuid, update: ProjectUpdate) -> PortResult<Project> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE projects SET updated_at = NOW()");
        if let Some(name) = update.name {
            builder.push(", name = ").push_bind(name);
        }
        let nullable = [
            ("description", update.description),
            ("main_problem", update.main_problem),
            ("min_feature_set", update.min_feature_set),
            ("out_of_scope", update.out_of_scope),
            ("success_criteria", update.success_criteria),
        ];
        for (column, value) in nullable {
            if let Some(value) = value {
                builder.push(format!(", {} = ", column)).push_bind(value);
            }
        }
        if let Some(status) = update.status {
            builder.push(", status = ").push_bind(status.as_str());
        }
        builder.push(" WHERE id = ").push_bind(project_id);
        builder.push(format!(" RETURNING {}", PROJECT_COLUMNS));

        builder
            .build_query_as::<ProjectRecord>()
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)?
            .ok_or_else(|| PortError::NotFound(format!("Project {} not found", project_id)))?
            .to_domain()
    }

    async fn delete_project(&self, project_id: Uuid) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Project {} not found", project_id)));
        }
        Ok(())
    }

    async fn store_prd(&self, project_id: Uuid, prd: &str) -> PortResult<Project> {
        sqlx::query_as::<_, ProjectRecord>(&format!(
            "UPDATE projects SET prd = $1, status = 'finished', updated_at = NOW() \
             WHERE id = $2 RETURNING {}",
            PROJECT_COLUMNS
        ))
        .bind(prd)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Project {} not found", project_id)))?
        .to_domain()
    }

    async fn list_questions(&self, project_id: Uuid) -> PortResult<Vec<Question>> {
        let records = sqlx::query_as::<_, QuestionRecord>(&format!(
            "SELECT {} FROM questions WHERE project_id = $1 ORDER BY sequence_number ASC",
            QUESTION_COLUMNS
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(QuestionRecord::to_domain).collect())
    }

    async fn max_sequence_number(&self, project_id: Uuid) -> PortResult<Option<i32>> {
        sqlx::query_scalar::<_, Option<i32>>(
            "SELECT MAX(sequence_number) FROM questions WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)
    }

    async fn insert_questions(
        &self,
        project_id: Uuid,
        questions: &[GeneratedQuestion],
    ) -> PortResult<Vec<Question>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let sql = format!(
            "INSERT INTO questions (id, project_id, question, sequence_number) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            QUESTION_COLUMNS
        );

        let mut inserted = Vec::with_capacity(questions.len());
        for question in questions {
            let record = sqlx::query_as::<_, QuestionRecord>(&sql)
                .bind(Uuid::new_v4())
                .bind(project_id)
                .bind(&question.question)
                .bind(question.sequence_number)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        PortError::Conflict(format!(
                            "Question {} already exists for project {}",
                            question.sequence_number, project_id
                        ))
                    } else {
                        unexpected(e)
                    }
                })?;
            inserted.push(record.to_domain());
        }

        tx.commit().await.map_err(unexpected)?;
        Ok(inserted)
    }

    async fn update_answer(&self, project_id: Uuid, question_id: Uuid, answer: &str) -> PortResult<bool> {
        let result = sqlx::query("UPDATE questions SET answer = $1 WHERE id = $2 AND project_id = $3")
            .bind(answer)
            .bind(question_id)
            .bind(project_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(result.rows_affected() > 0)
    }
}
