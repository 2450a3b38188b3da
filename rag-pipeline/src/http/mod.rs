//! HTTP clients for hosted embedding, ranking and completion endpoints.
//!
//! This module is only available when the `http` feature is enabled. All
//! clients speak the JSON APIs served by OpenAI-compatible and NVIDIA NIM
//! style model endpoints.

mod completion;
mod embedding;
mod reranker;

pub use completion::HttpCompletionModel;
pub use embedding::HttpEmbeddingProvider;
pub use reranker::HttpReranker;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::error::{RagError, Result};

/// Environment variable holding the API key used when none is given.
pub const API_KEY_ENV: &str = "APP_API_KEY";

/// Whether a response status may succeed on retry.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

pub(crate) fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}

pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

/// Post `body` as JSON and return the response if its status is a success.
///
/// Failures come back as [`RagError::ProviderRequest`] classified for retry.
pub(crate) async fn post_json<B: Serialize + ?Sized>(
    client: &reqwest::Client,
    url: &str,
    api_key: Option<&str>,
    provider: &str,
    body: &B,
) -> Result<reqwest::Response> {
    let mut request = client.post(url).json(body);
    if let Some(key) = api_key {
        request = request.bearer_auth(key);
    }
    let response = request.send().await.map_err(|e| send_error(provider, e))?;
    if !response.status().is_success() {
        return Err(status_error(provider, response).await);
    }
    Ok(response)
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Object { message: String },
    Text(String),
}

/// Pull a human-readable message out of an error response body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error: Some(ErrorDetail::Object { message }), .. })
        | Ok(ErrorBody { error: Some(ErrorDetail::Text(message)), .. }) => message,
        Ok(ErrorBody { detail: Some(serde_json::Value::String(detail)), .. }) => detail,
        Ok(ErrorBody { detail: Some(detail), .. }) => detail.to_string(),
        _ => body.to_string(),
    }
}

/// Map a failed send to a transient provider error.
fn send_error(provider: &str, e: reqwest::Error) -> RagError {
    error!(provider, error = %e, "request failed");
    RagError::ProviderRequest {
        provider: provider.to_string(),
        message: format!("request failed: {e}"),
        transient: true,
    }
}

/// Turn a non-success response into a provider error.
async fn status_error(provider: &str, response: reqwest::Response) -> RagError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = error_message(&body);
    let transient = is_transient_status(status);
    error!(provider, %status, transient, "API error");
    RagError::ProviderRequest {
        provider: provider.to_string(),
        message: format!("API returned {status}: {detail}"),
        transient,
    }
}

pub(crate) fn parse_error(provider: &str, e: reqwest::Error) -> RagError {
    error!(provider, error = %e, "failed to parse response");
    RagError::ProviderRequest {
        provider: provider.to_string(),
        message: format!("failed to parse response: {e}"),
        transient: false,
    }
}
