//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and the JSON
//! envelope every failed API request receives.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use planning_core::{CompletionError, GenerationError, PortError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::ConfigError;

/// The body of every error response: `{error, message?, details?}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), message: None, details: None }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents an error from running the embedded migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bad input detected at the HTTP boundary.
    #[error("{error}")]
    Validation {
        error: String,
        details: Option<serde_json::Value>,
    },

    #[error("Unauthorized")]
    Unauthorized(String),

    #[error("Forbidden")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// The session store could not be consulted.
    #[error("Authentication error")]
    AuthenticationFailed,

    /// A generation engine failed; `context` names the operation for the envelope.
    #[error("{context}: {source}")]
    Generation {
        context: &'static str,
        source: GenerationError,
    },

    /// A request-level failure with a stable `error` label.
    #[error("{error}: {message}")]
    Server { error: String, message: String },

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// Convenience type alias for handler return values.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(error: impl Into<String>) -> Self {
        ApiError::Validation { error: error.into(), details: None }
    }

    pub fn validation_with(error: impl Into<String>, details: serde_json::Value) -> Self {
        ApiError::Validation { error: error.into(), details: Some(details) }
    }

    pub fn server(error: impl Into<String>, message: impl std::fmt::Display) -> Self {
        ApiError::Server { error: error.into(), message: message.to_string() }
    }

    /// Maps a port failure from a handler, keeping not-found and conflicts visible.
    pub fn from_port(context: &str, err: PortError) -> Self {
        match err {
            PortError::NotFound(message) => ApiError::NotFound(message),
            PortError::Conflict(message) => ApiError::validation(message),
            PortError::Unauthorized => ApiError::Unauthorized("Authentication required".to_string()),
            PortError::Unexpected(message) => ApiError::server(context, message),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Validation { error, details } => ErrorBody {
                error: error.clone(),
                message: None,
                details: details.clone(),
            },
            ApiError::Unauthorized(message) => ErrorBody::new("Unauthorized").with_message(message),
            ApiError::Forbidden(message) => ErrorBody::new("Forbidden").with_message(message),
            ApiError::NotFound(message) => ErrorBody::new("Not found").with_message(message),
            ApiError::AuthenticationFailed => ErrorBody::new("Authentication error")
                .with_message("Failed to verify authentication"),
            ApiError::Generation { context, source } => {
                ErrorBody::new(*context).with_message(generation_message(source))
            }
            ApiError::Server { error, message } => ErrorBody::new(error.clone()).with_message(message),
            ApiError::Port(PortError::NotFound(message)) => {
                ErrorBody::new("Not found").with_message(message)
            }
            other => ErrorBody::new("Server error").with_message(other.to_string()),
        }
    }
}

fn generation_message(err: &GenerationError) -> String {
    match err {
        GenerationError::Completion(CompletionError::Timeout { after }) => {
            format!("The AI provider did not respond within {}ms", after.as_millis())
        }
        GenerationError::Completion(CompletionError::Configuration(_)) => {
            "The AI provider is not configured".to_string()
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(self.body())).into_response()
    }
}
