//! crates/planning_core/src/prd.rs
//!
//! The PRD generation engine. Unlike question generation there is no fallback:
//! any failure is returned to the caller.

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::completion::{ChatMessage, CompletionRequest, CompletionService};
use crate::domain::{Project, Question};
use crate::error::GenerationError;
use crate::ports::{DatabaseService, PortError};
use crate::prompts::{build_project_context, prd_prompt};

const MAX_TOKENS: u32 = 2000;

/// Asks the model for the planning summary and returns the markdown text.
pub async fn generate_prd_document(
    completion: &dyn CompletionService,
    credential: Option<&str>,
    model: &str,
    project: &Project,
    questions: &[Question],
) -> Result<String, GenerationError> {
    let context = build_project_context(&project.details());
    let messages = vec![ChatMessage::user(prd_prompt(&context, questions))];

    let request = CompletionRequest::new(model, messages)
        .with_max_tokens(MAX_TOKENS)
        .with_json_schema("document", json!({ "type": "string" }));

    let response = completion.complete(credential, request).await?;
    let document = parse_document(&response.content)?;
    info!(project_id = %project.id, length = document.len(), "Generated PRD document.");
    Ok(document)
}

/// The declared schema is a bare JSON string, so the content must decode as one.
pub fn parse_document(content: &str) -> Result<String, GenerationError> {
    let document: String = serde_json::from_str(content.trim())
        .map_err(|e| GenerationError::InvalidContent(format!("expected a JSON string: {}", e)))?;

    if document.trim().is_empty() {
        return Err(GenerationError::InvalidContent("empty document".to_string()));
    }
    Ok(document)
}

#[derive(Debug, thiserror::Error)]
pub enum PrdError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Loads the project and its questions, generates the document and stores it,
/// marking the project finished. Nothing is written unless generation succeeds.
pub async fn generate_and_store_prd(
    db: &dyn DatabaseService,
    completion: &dyn CompletionService,
    credential: Option<&str>,
    model: &str,
    project_id: Uuid,
) -> Result<Project, PrdError> {
    let project = db.get_project(project_id).await?;
    let questions = db.list_questions(project_id).await?;

    let document = generate_prd_document(completion, credential, model, &project, &questions).await?;

    Ok(db.store_prd(project_id, &document).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_is_decoded_not_trimmed() {
        let content = "\"### Decisions\\n1. Build a web app\\n\\n### Unresolved Issues\\nNone\"";
        let document = parse_document(content).unwrap();
        assert!(document.starts_with("### Decisions\n1."));
        assert!(document.ends_with("None"));
    }

    #[test]
    fn non_string_or_blank_documents_are_rejected() {
        assert!(matches!(
            parse_document("### Decisions"),
            Err(GenerationError::InvalidContent(_))
        ));
        assert!(matches!(
            parse_document(r#"{"document": "x"}"#),
            Err(GenerationError::InvalidContent(_))
        ));
        assert!(matches!(parse_document(r#""  ""#), Err(GenerationError::InvalidContent(_))));
    }
}
