//! Embedding providers and the batching/retry policy wrapped around them.
//!
//! [`EmbeddingProvider`] is the swappable capability: anything that turns
//! text into fixed-length vectors. [`Embedder`] wraps a provider with the
//! request policy from [`EmbeddingConfig`]: inputs are split into capped
//! sub-batches, sub-batches run with bounded concurrency, transient failures
//! are retried with exponential backoff, and any unrecoverable failure aborts
//! the whole call.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::config::{EmbeddingConfig, RetryConfig};
use crate::document::Embedding;
use crate::error::{RagError, Result};
use crate::retry::retry;

/// What the embedded text is used for. Asymmetric retrieval models embed
/// queries and passages differently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// A search query.
    Query,
    /// A document chunk to be indexed.
    Passage,
}

impl InputType {
    /// Wire name of the input type.
    pub fn as_str(self) -> &'static str {
        match self {
            InputType::Query => "query",
            InputType::Passage => "passage",
        }
    }
}

/// A provider that generates vector embeddings from text input.
///
/// The default [`embed_batch`](EmbeddingProvider::embed_batch) implementation
/// calls [`embed`](EmbeddingProvider::embed) sequentially; backends that
/// support native batching should override it. Failures that may succeed on
/// retry should be reported as
/// [`RagError::ProviderRequest`] with `transient: true`.
///
/// # Example
///
/// ```rust,ignore
/// use rag_pipeline::{EmbeddingProvider, InputType};
///
/// let embedding = provider.embed("hello world", InputType::Query).await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str, input_type: InputType) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs, in order.
    async fn embed_batch(&self, texts: &[&str], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, input_type).await?);
        }
        Ok(results)
    }

    /// Name (and version) of the model behind this provider.
    fn model(&self) -> &str;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// An [`EmbeddingProvider`] with batching, backpressure and retries applied.
///
/// Clones share the same in-flight limit, so one `Embedder` handed to several
/// concurrent ingestions never has more than `max_in_flight` requests open.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    max_batch_size: usize,
    max_concurrent_batches: usize,
    retry: RetryConfig,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("model", &self.provider.model())
            .field("max_batch_size", &self.max_batch_size)
            .field("max_concurrent_batches", &self.max_concurrent_batches)
            .field("max_attempts", &self.retry.max_attempts)
            .finish()
    }
}

impl Embedder {
    /// Wrap `provider` with the policy from `config`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self {
            provider,
            max_batch_size: config.max_batch_size.max(1),
            max_concurrent_batches: config.max_concurrent_batches.max(1),
            retry: config.retry(),
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
        }
    }

    /// Return a reference to the wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Name of the model producing the embeddings.
    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Dimensionality of the embeddings.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed a single query text.
    pub async fn embed_query(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.embed_all(&[text], InputType::Query).await?;
        let values = vectors.pop().ok_or_else(|| self.unavailable(1, "no vector returned"))?;
        Ok(Embedding { values, model: self.model().to_string() })
    }

    /// Embed chunk texts, one embedding per input in the same order.
    pub async fn embed_passages(&self, texts: &[&str]) -> Result<Vec<Embedding>> {
        let model = self.model().to_string();
        let vectors = self.embed_all(texts, InputType::Passage).await?;
        Ok(vectors.into_iter().map(|values| Embedding { values, model: model.clone() }).collect())
    }

    /// Split `texts` into capped sub-batches, embed them with bounded
    /// concurrency and concatenate the results in input order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingUnavailable`] if any sub-batch fails
    /// permanently or exhausts its retries; no partial result is returned.
    pub async fn embed_all(&self, texts: &[&str], input_type: InputType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            model = self.model(),
            input_count = texts.len(),
            batch_count = texts.len().div_ceil(self.max_batch_size),
            input_type = input_type.as_str(),
            "embedding inputs"
        );

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(self.max_batch_size))
            .map(|batch| self.embed_sub_batch(batch, input_type))
            .buffered(self.max_concurrent_batches)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    async fn embed_sub_batch(
        &self,
        batch: &[&str],
        input_type: InputType,
    ) -> Result<Vec<Vec<f32>>> {
        let _permit =
            self.permits.acquire().await.map_err(|_| self.unavailable(0, "embedder is shut down"))?;

        let (result, attempts) = retry(&self.retry, self.model(), || {
            self.provider.embed_batch(batch, input_type)
        })
        .await;

        let vectors = result.map_err(|e| {
            error!(model = self.model(), attempts, error = %e, "embedding request failed");
            self.unavailable(attempts, &e.to_string())
        })?;

        if vectors.len() != batch.len() {
            return Err(self.unavailable(
                attempts,
                &format!("expected {} vectors, provider returned {}", batch.len(), vectors.len()),
            ));
        }
        let expected = self.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: bad.len() });
        }
        if vectors.iter().flatten().any(|x| !x.is_finite()) {
            return Err(
                self.unavailable(attempts, "provider returned non-finite vector components")
            );
        }
        Ok(vectors)
    }

    fn unavailable(&self, attempts: u32, message: &str) -> RagError {
        RagError::EmbeddingUnavailable {
            model: self.model().to_string(),
            attempts,
            message: message.to_string(),
        }
    }
}
