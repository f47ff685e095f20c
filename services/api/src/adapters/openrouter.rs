//! services/api/src/adapters/openrouter.rs
//!
//! This module contains the adapter for the OpenRouter chat-completions API.
//! It implements the `CompletionService` port from the `core` crate using
//! [`reqwest`], enforcing a timeout, validating the response shape and
//! translating failures into `CompletionError` variants.

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use planning_core::completion::{
    ChatMessage, CompletionError, CompletionRequest, CompletionResult, CompletionService,
    ResponseFormat, TextStream, Usage,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const APP_TITLE: &str = "Project Planner";

//=========================================================================================
// Wire Types
//=========================================================================================

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat<'a>>,
    stream: bool,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireResponseFormat<'a> {
    Text,
    JsonSchema { json_schema: WireJsonSchema<'a> },
}

#[derive(Serialize)]
struct WireJsonSchema<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a serde_json::Value,
}

impl<'a> WireRequest<'a> {
    fn new(request: &'a CompletionRequest, stream: bool) -> Self {
        let response_format = request.response_format.as_ref().map(|format| match format {
            ResponseFormat::Text => WireResponseFormat::Text,
            ResponseFormat::JsonSchema { name, strict, schema } => WireResponseFormat::JsonSchema {
                json_schema: WireJsonSchema { name, strict: *strict, schema },
            },
        });
        Self {
            model: &request.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format,
            stream,
        }
    }
}

#[derive(Deserialize)]
struct WireResponse {
    id: String,
    choices: Vec<WireChoice>,
    model: String,
    usage: WireUsage,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct WireChoice {
    message: WireMessage,
    finish_reason: Option<String>,
    index: u32,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct WireMessage {
    content: String,
    role: String,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Deserialize)]
struct WireErrorEnvelope {
    error: WireError,
}

#[derive(Deserialize)]
struct WireError {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    param: Option<String>,
    /// Providers send either a string or a number here.
    code: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
}

#[derive(Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
}

#[derive(Deserialize, Default)]
struct WireDelta {
    content: Option<String>,
}

//=========================================================================================
// Response Parsing
//=========================================================================================

/// Translates a non-success response into a provider error, preferring the
/// structured `{error: {...}}` body when there is one.
pub fn parse_error_body(status: u16, reason: &str, body: &[u8]) -> CompletionError {
    match serde_json::from_slice::<WireErrorEnvelope>(body) {
        Ok(WireErrorEnvelope { error }) => CompletionError::Provider {
            status,
            message: error.message,
            error_type: error.error_type,
            param: error.param,
            code: error.code.map(|code| match code {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
        },
        Err(_) => CompletionError::Provider {
            status,
            message: format!("OpenRouter API error: {}", reason),
            error_type: None,
            param: None,
            code: None,
        },
    }
}

/// Validates a success body against the expected completion shape.
pub fn parse_completion_body(body: &[u8]) -> Result<CompletionResult, CompletionError> {
    let response: WireResponse = serde_json::from_slice(body)
        .map_err(|e| CompletionError::MalformedResponse(format!("schema validation failed: {}", e)))?;

    let first = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::MalformedResponse("response contained no choices".to_string()))?;

    Ok(CompletionResult {
        id: response.id,
        model: response.model,
        content: first.message.content,
        usage: Usage {
            prompt_tokens: response.usage.prompt_tokens,
            completion_tokens: response.usage.completion_tokens,
            total_tokens: response.usage.total_tokens,
        },
    })
}

//=========================================================================================
// Server-Sent Events Framing
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    Done,
}

/// Splits a streamed body into `data:` lines. Partial lines are kept until the
/// next chunk completes them.
#[derive(Default)]
pub struct SseDecoder {
    buffer: BytesMut,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(pos);
            self.buffer.advance(1);
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = self.buffer.split();
        decode_line(&rest).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let data = line.trim_end_matches('\r').strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    match serde_json::from_str::<WireStreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty())
            .map(SseEvent::Fragment),
        Err(e) => {
            warn!(error = %e, "Failed to parse streaming data line");
            None
        }
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CompletionService` against OpenRouter.
#[derive(Clone)]
pub struct OpenRouterAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenRouterAdapter {
    /// Creates a new `OpenRouterAdapter`. `base_url` is e.g. `https://openrouter.ai/api/v1`.
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url,
            timeout: planning_core::completion::DEFAULT_TIMEOUT,
        }
    }

    /// Bound applied to requests that do not carry their own timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn limit_for(&self, request: &CompletionRequest) -> Duration {
        request.timeout.unwrap_or(self.timeout)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn send(
        &self,
        key: &str,
        request: &CompletionRequest,
        stream: bool,
    ) -> Result<reqwest::Response, CompletionError> {
        debug!(model = %request.model, stream, "Sending completion request");
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(key)
            .header("X-Title", APP_TITLE)
            .json(&WireRequest::new(request, stream))
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        let err = parse_error_body(
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown status"),
            &body,
        );
        warn!(status = status.as_u16(), error = %err, "Completion request rejected by provider");
        Err(err)
    }
}

/// Runs `fut` under `limit`, dropping (and thereby aborting) it on expiry.
async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, CompletionError>
where
    F: Future<Output = Result<T, CompletionError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| CompletionError::Timeout { after: limit })?
}

//=========================================================================================
// `CompletionService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CompletionService for OpenRouterAdapter {
    async fn complete(
        &self,
        credential: Option<&str>,
        request: CompletionRequest,
    ) -> Result<CompletionResult, CompletionError> {
        request.preflight(credential)?;
        let key = credential.unwrap_or_default();
        let limit = self.limit_for(&request);

        with_timeout(limit, async {
            let response = self.send(key, &request, false).await?;
            let body = response
                .bytes()
                .await
                .map_err(|e| CompletionError::Transport(e.to_string()))?;
            parse_completion_body(&body)
        })
        .await
    }

    /// The timeout covers connecting and receiving the response head; the body
    /// then streams for as long as the provider keeps sending.
    async fn complete_streaming(
        &self,
        credential: Option<&str>,
        request: CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, CompletionError> {
        request.preflight(credential)?;
        let key = credential.unwrap_or_default();
        let limit = self.limit_for(&request);

        let response = with_timeout(limit, self.send(key, &request, true)).await?;
        Ok(text_stream(response.bytes_stream(), cancel))
    }
}

/// Turns a raw SSE body into content fragments. Ends at `[DONE]`, at the end
/// of the body, after the first transport error, or once `cancel` fires.
fn text_stream<S, E>(body: S, cancel: CancellationToken) -> TextStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut body = Box::pin(body);
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::default();
        let mut finished = false;
        while !finished {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("Completion stream cancelled by caller");
                    break;
                }
                next = body.next() => next,
            };

            let events = match next {
                Some(Ok(chunk)) => decoder.push(&chunk),
                Some(Err(e)) => {
                    yield Err(CompletionError::Transport(e.to_string()));
                    break;
                }
                None => {
                    finished = true;
                    decoder.finish()
                }
            };

            for event in events {
                if cancel.is_cancelled() {
                    finished = true;
                    break;
                }
                match event {
                    SseEvent::Fragment(text) => yield Ok(text),
                    SseEvent::Done => {
                        finished = true;
                        break;
                    }
                }
            }
        }
    };

    Box::pin(stream)
}
