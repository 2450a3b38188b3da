use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_key_from_env, endpoint, parse_error, post_json};
use crate::completion::{CompletionModel, TokenStream};
use crate::config::{LlmConfig, RetryConfig};
use crate::error::{RagError, Result};
use crate::prompt::Prompt;
use crate::retry::retry;

const PROVIDER: &str = "http-chat";

/// A [`CompletionModel`] calling an OpenAI-compatible `/chat/completions`
/// endpoint with one system and one user message.
///
/// Requests failing with a transient error are retried with exponential
/// backoff. Streamed completions are read as server-sent events.
pub struct HttpCompletionModel {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    retry: RetryConfig,
}

impl HttpCompletionModel {
    /// Create a client for `model` served at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        if base_url.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "completion base URL must not be empty".into(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            url: endpoint(base_url, "chat/completions"),
            model: model.into(),
            api_key: api_key_from_env(),
            temperature: Some(0.2),
            max_tokens: Some(1024),
            retry: RetryConfig::default(),
        })
    }

    /// Create a client from the `llm` section of the configuration.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            RagError::InvalidConfiguration("llm.base_url is required for the HTTP client".into())
        })?;
        Ok(Self::new(base_url, config.model.clone())?
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_retry(config.retry))
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the maximum number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the retry policy for transient failures.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Use a client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::InvalidConfiguration(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(self)
    }

    fn request<'a>(&'a self, prompt: &'a Prompt, stream: bool) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: [
                Message { role: "system", content: &prompt.system },
                Message { role: "user", content: &prompt.user },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream,
        }
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response> {
        let (result, attempts) = retry(&self.retry, PROVIDER, || {
            post_json(&self.client, &self.url, self.api_key.as_deref(), PROVIDER, body)
        })
        .await;
        result.map_err(|e| {
            completion_error(&self.model, format!("{e} (after {attempts} attempt(s))"))
        })
    }
}

fn completion_error(model: &str, message: impl Into<String>) -> RagError {
    RagError::Completion { model: model.to_string(), message: message.into() }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
enum StreamEvent {
    Token(String),
    Done,
}

/// Parse one line of a server-sent event stream. Lines that carry no text
/// (comments, keep-alives, role-only deltas) yield `None`.
fn parse_event_line(line: &str) -> std::result::Result<Option<StreamEvent>, serde_json::Error> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(Some(StreamEvent::Done));
    }
    if data.is_empty() {
        return Ok(None);
    }
    let chunk: ChatChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|t| !t.is_empty())
        .map(StreamEvent::Token))
}

/// Text pieces carried by a server-sent event byte stream, up to `[DONE]`.
fn event_tokens<S, B>(
    model: String,
    bytes: S,
) -> impl Stream<Item = Result<String>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    async_stream::try_stream! {
        let mut bytes = Box::pin(bytes);
        let mut buffer: Vec<u8> = Vec::new();
        'read: while let Some(chunk) = bytes.next().await {
            let chunk =
                chunk.map_err(|e| completion_error(&model, format!("stream interrupted: {e}")))?;
            buffer.extend_from_slice(chunk.as_ref());

            while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=end).collect();
                let line = String::from_utf8_lossy(&line);
                let event = parse_event_line(line.trim()).map_err(|e| {
                    completion_error(&model, format!("invalid stream event: {e}"))
                })?;
                match event {
                    Some(StreamEvent::Token(token)) => yield token,
                    Some(StreamEvent::Done) => break 'read,
                    None => {}
                }
            }
        }
    }
}

#[async_trait]
impl CompletionModel for HttpCompletionModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_chars = prompt.char_len(),
            "requesting completion"
        );

        let response = self.send(&self.request(prompt, false)).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| completion_error(&self.model, parse_error(PROVIDER, e).to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| completion_error(&self.model, "response contained no message content"))
    }

    async fn complete_stream(&self, prompt: &Prompt) -> Result<TokenStream> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_chars = prompt.char_len(),
            "requesting streamed completion"
        );

        let response = self.send(&self.request(prompt, true)).await?;
        Ok(Box::pin(event_tokens(self.model.clone(), response.bytes_stream())))
    }

    fn model(&self) -> &str {
        &self.model
    }
}
