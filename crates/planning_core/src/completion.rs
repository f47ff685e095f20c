//! crates/planning_core/src/completion.rs
//!
//! The structured-completion contract shared by both generation engines.
//! The HTTP implementation lives in the `api` service; this module only
//! describes requests, results and failures.

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Timeout applied when a request does not carry its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// The output shape requested from the model.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseFormat {
    Text,
    JsonSchema {
        name: String,
        strict: bool,
        schema: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub response_format: Option<ResponseFormat>,
    pub timeout: Option<Duration>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            response_format: None,
            timeout: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_json_schema(mut self, name: &str, schema: serde_json::Value) -> Self {
        self.response_format = Some(ResponseFormat::JsonSchema {
            name: name.to_string(),
            strict: true,
            schema,
        });
        self
    }

    /// Checks that must pass before anything is sent over the network.
    pub fn preflight(&self, credential: Option<&str>) -> Result<(), CompletionError> {
        if credential.map_or(true, |key| key.trim().is_empty()) {
            return Err(CompletionError::Configuration(
                "LLM API key is not configured".to_string(),
            ));
        }
        if self.messages.is_empty() {
            return Err(CompletionError::Validation("No messages provided".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(CompletionError::Validation("No model specified".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A validated, non-streaming completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResult {
    pub id: String,
    pub model: String,
    /// Content of the first choice.
    pub content: String,
    pub usage: Usage,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompletionError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid completion request: {0}")]
    Validation(String),

    #[error("Request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("Provider error ({status}): {message}")]
    Provider {
        status: u16,
        message: String,
        error_type: Option<String>,
        param: Option<String>,
        code: Option<String>,
    },

    #[error("Invalid response format from provider: {0}")]
    MalformedResponse(String),

    #[error("Failed to communicate with provider: {0}")]
    Transport(String),
}

/// Incremental completion text. Finite and forward-only; dropping it aborts the request.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends one chat request and returns the first choice's content.
    async fn complete(
        &self,
        credential: Option<&str>,
        request: CompletionRequest,
    ) -> Result<CompletionResult, CompletionError>;

    /// Streams the response as text fragments until the provider finishes
    /// or `cancel` fires.
    async fn complete_streaming(
        &self,
        credential: Option<&str>,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, CompletionError>;
}
