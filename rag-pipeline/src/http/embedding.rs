use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_key_from_env, endpoint, parse_error, post_json};
use crate::config::EmbeddingConfig;
use crate::embedding::{EmbeddingProvider, InputType};
use crate::error::{RagError, Result};

const PROVIDER: &str = "http-embeddings";

/// An [`EmbeddingProvider`] calling a `/embeddings` endpoint.
///
/// Requests carry the `input_type` field used by asymmetric retrieval
/// models; disable it with [`without_input_type`](Self::without_input_type)
/// for endpoints that reject unknown fields.
///
/// Each call makes one request. Transient failures are retried by the
/// [`Embedder`](crate::Embedder) wrapping the provider.
///
/// # Example
///
/// ```rust,ignore
/// use rag_pipeline::http::HttpEmbeddingProvider;
///
/// let provider =
///     HttpEmbeddingProvider::new("http://localhost:9080/v1", "nvidia/nv-embedqa-e5-v5", 1024)?
///         .with_api_key("nvapi-...");
/// ```
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
    truncate: Option<String>,
    send_input_type: bool,
}

impl HttpEmbeddingProvider {
    /// Create a provider for `model` served at `base_url`.
    ///
    /// The API key defaults to the `APP_API_KEY` environment variable.
    pub fn new(base_url: &str, model: impl Into<String>, dimensions: usize) -> Result<Self> {
        if base_url.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "embedding base URL must not be empty".into(),
            ));
        }
        if dimensions == 0 {
            return Err(RagError::InvalidConfiguration(
                "embedding dimensions must be greater than zero".into(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            url: endpoint(base_url, "embeddings"),
            model: model.into(),
            dimensions,
            api_key: api_key_from_env(),
            truncate: Some("END".to_string()),
            send_input_type: true,
        })
    }

    /// Create a provider from the embedding section of the configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            RagError::InvalidConfiguration(
                "embedding.base_url is required for the HTTP provider".into(),
            )
        })?;
        Self::new(base_url, config.model.clone(), config.dimensions)
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the server-side truncation mode (`NONE`, `START` or `END`).
    pub fn with_truncate(mut self, truncate: Option<String>) -> Self {
        self.truncate = truncate;
        self
    }

    /// Do not send `input_type` and `truncate`.
    pub fn without_input_type(mut self) -> Self {
        self.send_input_type = false;
        self
    }

    /// Use a client with a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = reqwest::Client::builder().timeout(timeout).build().map_err(|e| {
            RagError::InvalidConfiguration(format!("failed to build HTTP client: {e}"))
        })?;
        Ok(self)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [&'a str],
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<&'a str>,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

fn into_ordered(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str, input_type: InputType) -> Result<Vec<f32>> {
        let results = self.embed_batch(&[text], input_type).await?;
        results.into_iter().next().ok_or_else(|| RagError::ProviderRequest {
            provider: PROVIDER.into(),
            message: "API returned empty response".into(),
            transient: false,
        })
    }

    async fn embed_batch(&self, texts: &[&str], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            input_type = input_type.as_str(),
            "embedding batch"
        );

        let body = EmbeddingRequest {
            input: texts,
            model: &self.model,
            input_type: self.send_input_type.then(|| input_type.as_str()),
            truncate: if self.send_input_type { self.truncate.as_deref() } else { None },
            encoding_format: "float",
        };

        let response =
            post_json(&self.client, &self.url, self.api_key.as_deref(), PROVIDER, &body).await?;
        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| parse_error(PROVIDER, e))?;
        Ok(into_ordered(parsed.data))
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
