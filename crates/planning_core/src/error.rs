//! crates/planning_core/src/error.rs

use crate::completion::CompletionError;

/// Failures of the question and PRD generation engines.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    /// The model answered, but not in the declared shape.
    #[error("AI returned an invalid response format: {0}")]
    InvalidContent(String),
}
