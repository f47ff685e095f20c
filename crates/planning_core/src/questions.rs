//! crates/planning_core/src/questions.rs
//!
//! The question generation engine. Asks the model for a fixed number of
//! planning questions and falls back to the template bank on any AI failure,
//! so callers always receive exactly the requested number of questions.

use serde_json::json;
use tracing::{info, warn};

use crate::completion::{ChatMessage, CompletionRequest, CompletionService};
use crate::domain::{GeneratedQuestion, ProjectDetails, QuestionAnswer};
use crate::error::GenerationError;
use crate::fallback::fallback_questions;
use crate::prompts::{build_project_context, questions_system_prompt, questions_user_message};

pub const DEFAULT_QUESTION_COUNT: usize = 5;
const MAX_TOKENS: u32 = 2000;

/// What to generate and where numbering starts.
#[derive(Debug, Clone)]
pub struct QuestionBatch<'a> {
    pub details: &'a ProjectDetails,
    pub count: usize,
    pub start_sequence_number: i32,
    pub previous: &'a [QuestionAnswer],
}

impl<'a> QuestionBatch<'a> {
    pub fn new(details: &'a ProjectDetails) -> Self {
        Self {
            details,
            count: DEFAULT_QUESTION_COUNT,
            start_sequence_number: 1,
            previous: &[],
        }
    }
}

/// Returns exactly `batch.count` questions numbered `start..start + count`.
///
/// Never fails: provider errors, timeouts and malformed output are logged and
/// replaced by template questions.
pub async fn generate_questions(
    completion: &dyn CompletionService,
    credential: Option<&str>,
    model: &str,
    batch: QuestionBatch<'_>,
) -> Vec<GeneratedQuestion> {
    match request_questions(completion, credential, model, &batch).await {
        Ok(questions) => {
            info!(count = questions.len(), "Generated questions with the AI model.");
            questions
        }
        Err(e) => {
            warn!(error = %e, "AI question generation failed, using fallback questions.");
            fallback_questions(&mut rand::rng(), batch.count, batch.start_sequence_number)
        }
    }
}

async fn request_questions(
    completion: &dyn CompletionService,
    credential: Option<&str>,
    model: &str,
    batch: &QuestionBatch<'_>,
) -> Result<Vec<GeneratedQuestion>, GenerationError> {
    let context = build_project_context(batch.details);
    let messages = vec![
        ChatMessage::system(questions_system_prompt(batch.count)),
        ChatMessage::user(questions_user_message(&context, batch.previous, batch.count)),
    ];

    let request = CompletionRequest::new(model, messages)
        .with_max_tokens(MAX_TOKENS)
        .with_json_schema("questions", questions_schema(batch.count));

    let response = completion.complete(credential, request).await?;
    let texts = parse_questions(&response.content, batch.count)?;

    Ok(texts
        .into_iter()
        .zip(batch.start_sequence_number..)
        .map(|(question, sequence_number)| GeneratedQuestion {
            question,
            sequence_number,
        })
        .collect())
}

pub fn questions_schema(count: usize) -> serde_json::Value {
    json!({
        "type": "array",
        "minItems": count,
        "maxItems": count,
        "items": { "type": "string" }
    })
}

/// Validates model output against the declared schema: a JSON array of
/// exactly `count` non-blank strings.
pub fn parse_questions(content: &str, count: usize) -> Result<Vec<String>, GenerationError> {
    if content.trim().is_empty() {
        return Err(GenerationError::InvalidContent("empty content".to_string()));
    }

    let questions: Vec<String> = serde_json::from_str(content.trim())
        .map_err(|e| GenerationError::InvalidContent(format!("expected an array of strings: {}", e)))?;

    if questions.len() != count {
        return Err(GenerationError::InvalidContent(format!(
            "expected {} questions, got {}",
            count,
            questions.len()
        )));
    }
    if questions.iter().any(|q| q.trim().is_empty()) {
        return Err(GenerationError::InvalidContent("blank question".to_string()));
    }

    Ok(questions.into_iter().map(|q| q.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{CompletionError, CompletionResult, TextStream, Usage};
    use crate::fallback::QuestionCategory;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// Answers every request with the same scripted outcome and records requests.
    struct Scripted {
        outcome: Result<String, CompletionError>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(outcome: Result<String, CompletionError>) -> Self {
            Self { outcome, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl CompletionService for Scripted {
        async fn complete(
            &self,
            credential: Option<&str>,
            request: CompletionRequest,
        ) -> Result<CompletionResult, CompletionError> {
            request.preflight(credential)?;
            self.seen.lock().unwrap().push(request);
            self.outcome.clone().map(|content| CompletionResult {
                id: "gen-1".into(),
                model: "test/model".into(),
                content,
                usage: Usage { prompt_tokens: 1, completion_tokens: 1, total_tokens: 2 },
            })
        }

        async fn complete_streaming(
            &self,
            _credential: Option<&str>,
            _request: CompletionRequest,
            _cancel: CancellationToken,
        ) -> Result<TextStream, CompletionError> {
            Err(CompletionError::Validation("not scripted".into()))
        }
    }

    fn details() -> ProjectDetails {
        ProjectDetails { name: "Todo App".into(), ..Default::default() }
    }

    fn assert_contiguous(questions: &[GeneratedQuestion], start: i32, count: usize) {
        assert_eq!(questions.len(), count);
        for (i, q) in questions.iter().enumerate() {
            assert_eq!(q.sequence_number, start + i as i32);
        }
    }

    #[tokio::test]
    async fn model_questions_keep_provider_order_and_numbering() {
        let service = Scripted::new(Ok(r#"["First?", "Second?", "Third?"]"#.into()));
        let details = details();
        let batch = QuestionBatch { count: 3, start_sequence_number: 6, ..QuestionBatch::new(&details) };

        let questions = generate_questions(&service, Some("key"), "test/model", batch).await;

        assert_contiguous(&questions, 6, 3);
        assert_eq!(questions[0].question, "First?");
        assert_eq!(questions[2].question, "Third?");

        let seen = service.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].max_tokens, Some(2000));
        assert!(seen[0].messages[1].content.contains("Project Name: Todo App"));
    }

    #[tokio::test]
    async fn wrong_count_falls_back_to_templates() {
        let service = Scripted::new(Ok(r#"["Only one?"]"#.into()));
        let details = details();
        let batch = QuestionBatch { count: 4, ..QuestionBatch::new(&details) };

        let questions = generate_questions(&service, Some("key"), "test/model", batch).await;

        assert_contiguous(&questions, 1, 4);
        assert!(questions.iter().all(|q| QuestionCategory::of(&q.question).is_some()));
    }

    #[tokio::test]
    async fn provider_failure_and_missing_key_fall_back() {
        let details = details();
        let failing = Scripted::new(Err(CompletionError::Timeout {
            after: std::time::Duration::from_secs(30),
        }));
        let questions = generate_questions(&failing, Some("key"), "m", QuestionBatch::new(&details)).await;
        assert_contiguous(&questions, 1, DEFAULT_QUESTION_COUNT);

        let unconfigured = Scripted::new(Ok(r#"["a","b","c","d","e"]"#.into()));
        let questions = generate_questions(&unconfigured, None, "m", QuestionBatch::new(&details)).await;
        assert_contiguous(&questions, 1, DEFAULT_QUESTION_COUNT);
        assert!(unconfigured.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_non_string_items_and_blanks() {
        assert!(parse_questions("[1, 2]", 2).is_err());
        assert!(parse_questions(r#"{"questions": ["a"]}"#, 1).is_err());
        assert!(parse_questions(r#"["a", "  "]"#, 2).is_err());
        assert!(parse_questions("not json", 1).is_err());
        assert_eq!(parse_questions(" [\" a \"] ", 1).unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn schema_pins_the_item_count() {
        let schema = questions_schema(3);
        assert_eq!(schema["minItems"], 3);
        assert_eq!(schema["maxItems"], 3);
        assert_eq!(schema["items"]["type"], "string");
    }
}
