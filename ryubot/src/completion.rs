//! Chat-completion gateway.
//!
//! Builds the prompt (system preamble followed by the session window), sends
//! one request to an OpenAI-compatible `/chat/completions` endpoint and
//! extracts `choices[0].message.content` from the reply.

use crate::mode::Mode;
use crate::session::{Session, Turn};
use async_trait::async_trait;
use ryubot_common::config::CompletionConfig;
use ryubot_common::util::{sanitize_for_log, truncate_with_ellipsis};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Returned in place of a reply whose message has no `content`.
pub const FALLBACK_CONTENT: &str = "Failed to generate a response.";

/// How much of an error body is kept for logs.
const ERROR_BODY_PREVIEW_CHARS: usize = 500;

// ============================================================================
// Wire types
// ============================================================================

/// Request body for the completions endpoint.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [Turn],
    pub temperature: f64,
}

/// Response body. Every level is optional so that each missing piece maps to
/// its own error instead of a generic decode failure.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Option<Vec<Choice>>,
}

/// One completion choice. `message` stays untyped: a non-object message and a
/// non-string `content` each have their own outcome.
#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

impl Choice {
    /// The message text, `None` if the message has no string `content`.
    ///
    /// Fails with `MissingMessage` when `message` is absent or not an object.
    pub fn content(&self) -> Result<Option<&str>, CompletionError> {
        let message = self
            .message
            .as_ref()
            .and_then(serde_json::Value::as_object)
            .ok_or(CompletionError::MissingMessage)?;
        Ok(message.get("content").and_then(serde_json::Value::as_str))
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Completion failure. None of these mutate conversation state.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("completion endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("completion response contained no choices")]
    EmptyChoices,

    #[error("first completion choice has no message")]
    MissingMessage,
}

impl CompletionError {
    /// Fixed text shown to the chat for this failure.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Transport(_) => "⚠️ Error: network failure, please try again.",
            Self::Status { .. } => "⚠️ Error: the AI service rejected the request.",
            Self::Malformed(_) => "⚠️ Error: failed to process the AI response.",
            Self::EmptyChoices => "⚠️ Invalid response from the AI.",
            Self::MissingMessage => "⚠️ The AI did not respond.",
        }
    }
}

/// Extract the reply text from a response body.
pub fn parse_completion(body: &[u8]) -> Result<String, CompletionError> {
    let response: ChatCompletionResponse =
        serde_json::from_slice(body).map_err(CompletionError::Malformed)?;

    let choice = response
        .choices
        .and_then(|choices| choices.into_iter().next())
        .ok_or(CompletionError::EmptyChoices)?;

    Ok(choice.content()?.unwrap_or(FALLBACK_CONTENT).to_string())
}

/// `[system preamble] + session turns`.
pub fn build_prompt(system_prompt: &str, session: &Session) -> Vec<Turn> {
    std::iter::once(Turn::system(system_prompt))
        .chain(session.turns().cloned())
        .collect()
}

// ============================================================================
// Provider
// ============================================================================

/// Something that can turn a conversation into the assistant's next reply.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, session: &Session, mode: &Mode) -> Result<String, CompletionError>;
}

/// HTTP client for the remote completions endpoint.
pub struct CompletionClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    system_prompt: String,
}

impl CompletionClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        system_prompt: impl Into<String>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            system_prompt: system_prompt.into(),
        })
    }

    pub fn from_config(config: &CompletionConfig) -> reqwest::Result<Self> {
        Self::new(
            config.endpoint.clone(),
            config.api_key.clone(),
            config.system_prompt.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl CompletionProvider for CompletionClient {
    async fn complete(&self, session: &Session, mode: &Mode) -> Result<String, CompletionError> {
        let messages = build_prompt(&self.system_prompt, session);
        let body = ChatCompletionRequest {
            model: &mode.model,
            messages: &messages,
            temperature: mode.temperature,
        };

        let started = Instant::now();
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(CompletionError::Transport)?;

        let status = resp.status();
        let bytes = resp.bytes().await.map_err(CompletionError::Transport)?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes);
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: sanitize_for_log(&truncate_with_ellipsis(&text, ERROR_BODY_PREVIEW_CHARS)),
            });
        }

        let content = parse_completion(&bytes)?;

        tracing::info!(
            model = %mode.model,
            temperature = mode.temperature,
            prompt_turns = messages.len(),
            response_chars = content.chars().count(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Completion received"
        );
        Ok(content)
    }
}
