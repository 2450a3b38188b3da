//! Configuration for the ingestion and retrieval pipeline.
//!
//! A single [`RagConfig`] value is built once and handed to each component
//! at construction time. It can be assembled with [`RagConfig::builder`],
//! parsed from JSON, or read from `APP_*` environment variables.

use serde::{Deserialize, Serialize};

use crate::document::SimilarityMetric;
use crate::error::{RagError, Result};

/// The unit in which chunk sizes and overlaps are measured.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkUnit {
    /// Unicode scalar values.
    #[default]
    Characters,
    /// Whitespace-delimited tokens.
    Words,
}

/// Parameters for splitting text into chunks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in `unit`s.
    pub max_size: usize,
    /// Units shared by consecutive chunks. Must be smaller than `max_size`.
    pub overlap: usize,
    /// A trailing remainder contributing fewer new units than this is merged
    /// into the preceding chunk.
    pub min_chunk_size: usize,
    /// Unit of `max_size`, `overlap` and `min_chunk_size`.
    pub unit: ChunkUnit,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_size: 512, overlap: 100, min_chunk_size: 32, unit: ChunkUnit::Characters }
    }
}

impl ChunkingConfig {
    /// Check that the parameters guarantee forward progress.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if `max_size == 0`,
    /// `overlap >= max_size`, or `min_chunk_size >= max_size`.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(RagError::InvalidConfiguration(
                "chunk max_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.max_size {
            return Err(RagError::InvalidConfiguration(format!(
                "chunk overlap ({}) must be less than max_size ({})",
                self.overlap, self.max_size
            )));
        }
        if self.min_chunk_size >= self.max_size {
            return Err(RagError::InvalidConfiguration(format!(
                "min_chunk_size ({}) must be less than max_size ({})",
                self.min_chunk_size, self.max_size
            )));
        }
        Ok(())
    }
}

/// Embedding model selection and the batching/retry policy applied to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Model name sent to the embedding endpoint.
    pub model: String,
    /// Dimensionality of the vectors the model produces.
    pub dimensions: usize,
    /// Base URL of an OpenAI-compatible embedding endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Similarity metric for collections created with this model.
    pub metric: SimilarityMetric,
    /// Maximum number of texts per request.
    pub max_batch_size: usize,
    /// Maximum sub-requests in flight for one embedding call.
    pub max_concurrent_batches: usize,
    /// Maximum requests in flight across all callers sharing an embedder.
    pub max_in_flight: usize,
    /// Attempts per sub-request before giving up (first try included).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for a single retry delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "nvidia/nv-embedqa-e5-v5".to_string(),
            dimensions: 1024,
            base_url: None,
            metric: SimilarityMetric::Cosine,
            max_batch_size: 32,
            max_concurrent_batches: 4,
            max_in_flight: 8,
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
        }
    }
}

impl EmbeddingConfig {
    /// The retry policy applied to embedding requests.
    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
        }
    }
}

/// Retry policy for transient failures of a remote model endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per request before giving up (first try included).
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for a single retry delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 200, max_backoff_ms: 5_000 }
    }
}

/// The chat model that answers queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Model name sent to the completion endpoint.
    pub model: String,
    /// Base URL of an OpenAI-compatible chat completion endpoint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum number of generated tokens.
    pub max_tokens: u32,
    /// Retry policy for completion requests.
    pub retry: RetryConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "meta/llama-3.1-8b-instruct".to_string(),
            base_url: None,
            temperature: 0.2,
            max_tokens: 1024,
            retry: RetryConfig::default(),
        }
    }
}

/// The ranking model that reorders retrieved candidates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RankingConfig {
    /// Model name sent to the ranking endpoint.
    pub model: String,
    /// Base URL of the ranking endpoint. No reranking without one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Retry policy for ranking requests.
    pub retry: RetryConfig,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            model: "nv-rerank-qa-mistral-4b:1".to_string(),
            base_url: None,
            retry: RetryConfig::default(),
        }
    }
}

/// Parameters for query-time retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of results returned to the caller.
    pub top_k: usize,
    /// Minimum similarity score; results below it are filtered out.
    pub score_threshold: Option<f32>,
    /// Candidates fetched from the store before deduplication and
    /// reranking. Defaults to `4 * top_k` with a reranker, `2 * top_k` when
    /// deduplicating and `top_k` otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_k: Option<usize>,
    /// Drop candidates whose text duplicates a higher-scored candidate.
    pub deduplicate: bool,
    /// Abort a query after this many milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            score_threshold: Some(0.25),
            candidate_k: None,
            deduplicate: true,
            timeout_ms: None,
        }
    }
}

/// Parameters for prompt assembly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    /// Maximum length of the assembled prompt in characters.
    pub max_prompt_chars: usize,
    /// Instruction placed at the top of every prompt.
    pub system_instruction: String,
    /// Instruction for answering without retrieved context.
    pub chat_instruction: String,
    /// Answer returned without calling the model when retrieval finds nothing.
    pub no_context_answer: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_prompt_chars: 6_000,
            system_instruction: "You are a helpful AI assistant. Use only the context below to \
                                 answer the question. If the context does not contain the \
                                 answer, say that you do not know."
                .to_string(),
            chat_instruction: "You are a helpful, respectful and honest assistant. Always answer \
                               as helpfully as possible, while being safe."
                .to_string(),
            no_context_answer: "No response generated, make sure your query is relevant to the \
                                ingested documents."
                .to_string(),
        }
    }
}

/// Parameters for bulk ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionConfig {
    /// Documents processed concurrently in a bulk ingestion.
    pub max_concurrent_documents: usize,
    /// Chunks embedded and upserted per step; progress is recorded after each.
    pub upsert_window: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self { max_concurrent_documents: 4, upsert_window: 64 }
    }
}

/// Configuration parameters for the whole pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Chunking parameters.
    pub chunking: ChunkingConfig,
    /// Embedding model and request policy.
    pub embedding: EmbeddingConfig,
    /// Retrieval parameters.
    pub retrieval: RetrievalConfig,
    /// Prompt assembly parameters.
    pub prompt: PromptConfig,
    /// Bulk ingestion parameters.
    pub ingestion: IngestionConfig,
    /// Chat completion model.
    pub llm: LlmConfig,
    /// Ranking model.
    pub ranking: RankingConfig,
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RagConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read overrides from `APP_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading variables through `lookup`.
    ///
    /// Recognised variables: `APP_TEXTSPLITTER_CHUNKSIZE`,
    /// `APP_TEXTSPLITTER_CHUNKOVERLAP`, `APP_TEXTSPLITTER_MINCHUNKSIZE`,
    /// `APP_EMBEDDINGS_MODELNAME`, `APP_EMBEDDINGS_DIMENSIONS`,
    /// `APP_EMBEDDINGS_SERVERURL`, `APP_EMBEDDINGS_BATCHSIZE`,
    /// `APP_EMBEDDINGS_MAXATTEMPTS`, `APP_RETRIEVER_TOPK`,
    /// `APP_RETRIEVER_SCORETHRESHOLD`, `APP_RETRIEVER_TIMEOUTMS`,
    /// `APP_PROMPT_MAXCHARS`, `APP_INGESTION_CONCURRENCY`,
    /// `APP_LLM_MODELNAME`, `APP_LLM_SERVERURL`, `APP_LLM_TEMPERATURE`,
    /// `APP_LLM_MAXTOKENS`, `APP_RANKING_MODELNAME`, `APP_RANKING_SERVERURL`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RagConfig::default();

        if let Some(v) = parse_var(&lookup, "APP_TEXTSPLITTER_CHUNKSIZE")? {
            config.chunking.max_size = v;
        }
        if let Some(v) = parse_var(&lookup, "APP_TEXTSPLITTER_CHUNKOVERLAP")? {
            config.chunking.overlap = v;
        }
        if let Some(v) = parse_var(&lookup, "APP_TEXTSPLITTER_MINCHUNKSIZE")? {
            config.chunking.min_chunk_size = v;
        }
        if let Some(v) = lookup("APP_EMBEDDINGS_MODELNAME") {
            config.embedding.model = v;
        }
        if let Some(v) = parse_var(&lookup, "APP_EMBEDDINGS_DIMENSIONS")? {
            config.embedding.dimensions = v;
        }
        if let Some(v) = lookup("APP_EMBEDDINGS_SERVERURL").filter(|v| !v.is_empty()) {
            config.embedding.base_url = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "APP_EMBEDDINGS_BATCHSIZE")? {
            config.embedding.max_batch_size = v;
        }
        if let Some(v) = parse_var(&lookup, "APP_EMBEDDINGS_MAXATTEMPTS")? {
            config.embedding.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "APP_RETRIEVER_TOPK")? {
            config.retrieval.top_k = v;
        }
        if let Some(v) = parse_var::<f32, _>(&lookup, "APP_RETRIEVER_SCORETHRESHOLD")? {
            config.retrieval.score_threshold = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "APP_RETRIEVER_TIMEOUTMS")? {
            config.retrieval.timeout_ms = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "APP_PROMPT_MAXCHARS")? {
            config.prompt.max_prompt_chars = v;
        }
        if let Some(v) = parse_var(&lookup, "APP_INGESTION_CONCURRENCY")? {
            config.ingestion.max_concurrent_documents = v;
        }
        if let Some(v) = lookup("APP_LLM_MODELNAME").filter(|v| !v.is_empty()) {
            config.llm.model = v;
        }
        if let Some(v) = lookup("APP_LLM_SERVERURL").filter(|v| !v.is_empty()) {
            config.llm.base_url = Some(v);
        }
        if let Some(v) = parse_var(&lookup, "APP_LLM_TEMPERATURE")? {
            config.llm.temperature = v;
        }
        if let Some(v) = parse_var(&lookup, "APP_LLM_MAXTOKENS")? {
            config.llm.max_tokens = v;
        }
        if let Some(v) = lookup("APP_RANKING_MODELNAME").filter(|v| !v.is_empty()) {
            config.ranking.model = v;
        }
        if let Some(v) = lookup("APP_RANKING_SERVERURL").filter(|v| !v.is_empty()) {
            config.ranking.base_url = Some(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] describing the first
    /// inconsistent parameter.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        let embedding = &self.embedding;
        if embedding.model.trim().is_empty() {
            return Err(invalid("embedding model must not be empty"));
        }
        if embedding.dimensions == 0 {
            return Err(invalid("embedding dimensions must be greater than zero"));
        }
        if embedding.max_batch_size == 0 {
            return Err(invalid("max_batch_size must be greater than zero"));
        }
        if embedding.max_concurrent_batches == 0 || embedding.max_in_flight == 0 {
            return Err(invalid("embedding concurrency limits must be greater than zero"));
        }
        if embedding.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least one"));
        }

        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 {
            return Err(invalid("top_k must be greater than zero"));
        }
        if let Some(threshold) = retrieval.score_threshold {
            if !threshold.is_finite() {
                return Err(invalid("score_threshold must be a finite number"));
            }
        }
        if let Some(candidate_k) = retrieval.candidate_k {
            if candidate_k < retrieval.top_k {
                return Err(RagError::InvalidConfiguration(format!(
                    "candidate_k ({candidate_k}) must be at least top_k ({})",
                    retrieval.top_k
                )));
            }
        }

        if self.prompt.max_prompt_chars == 0 {
            return Err(invalid("max_prompt_chars must be greater than zero"));
        }
        if self.ingestion.max_concurrent_documents == 0 || self.ingestion.upsert_window == 0 {
            return Err(invalid(
                "ingestion concurrency and upsert_window must be greater than zero",
            ));
        }

        if self.llm.model.trim().is_empty() {
            return Err(invalid("llm model must not be empty"));
        }
        if !self.llm.temperature.is_finite() || self.llm.temperature < 0.0 {
            return Err(invalid("llm temperature must be a non-negative number"));
        }
        if self.ranking.model.trim().is_empty() {
            return Err(invalid("ranking model must not be empty"));
        }
        if self.llm.retry.max_attempts == 0 || self.ranking.retry.max_attempts == 0 {
            return Err(invalid("retry max_attempts must be at least one"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> RagError {
    RagError::InvalidConfiguration(message.to_string())
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            RagError::InvalidConfiguration(format!("{key} has an invalid value: '{raw}'"))
        }),
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Replace the chunking section.
    pub fn chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.config.chunking = chunking;
        self
    }

    /// Replace the embedding section.
    pub fn embedding(mut self, embedding: EmbeddingConfig) -> Self {
        self.config.embedding = embedding;
        self
    }

    /// Replace the retrieval section.
    pub fn retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    /// Replace the prompt section.
    pub fn prompt(mut self, prompt: PromptConfig) -> Self {
        self.config.prompt = prompt;
        self
    }

    /// Replace the ingestion section.
    pub fn ingestion(mut self, ingestion: IngestionConfig) -> Self {
        self.config.ingestion = ingestion;
        self
    }

    /// Set the maximum chunk size.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunking.max_size = size;
        self
    }

    /// Set the overlap between consecutive chunks.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunking.overlap = overlap;
        self
    }

    /// Set the minimum size of a trailing chunk.
    pub fn min_chunk_size(mut self, size: usize) -> Self {
        self.config.chunking.min_chunk_size = size;
        self
    }

    /// Set the number of top results to return.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.retrieval.top_k = k;
        self
    }

    /// Set the minimum similarity score for results.
    pub fn score_threshold(mut self, threshold: f32) -> Self {
        self.config.retrieval.score_threshold = Some(threshold);
        self
    }

    /// Disable score filtering.
    pub fn no_score_threshold(mut self) -> Self {
        self.config.retrieval.score_threshold = None;
        self
    }

    /// Set the maximum number of texts per embedding request.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.embedding.max_batch_size = size;
        self
    }

    /// Set the prompt length budget in characters.
    pub fn max_prompt_chars(mut self, chars: usize) -> Self {
        self.config.prompt.max_prompt_chars = chars;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if any section is invalid,
    /// for example when `chunk_overlap >= chunk_size` or `top_k == 0`.
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        RagConfig::default().validate().unwrap();
    }

    #[test]
    fn builder_rejects_overlap_not_below_size() {
        let err = RagConfig::builder().chunk_size(100).chunk_overlap(100).build().unwrap_err();
        assert!(matches!(err, RagError::InvalidConfiguration(_)));
    }

    #[test]
    fn builder_rejects_zero_top_k() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
    }

    #[test]
    fn json_missing_fields_use_defaults() {
        let config = RagConfig::from_json_str(
            r#"{"retrieval": {"top_k": 7}, "chunking": {"max_size": 300, "overlap": 50}}"#,
        )
        .unwrap();
        assert_eq!(config.retrieval.top_k, 7);
        assert_eq!(config.retrieval.score_threshold, Some(0.25));
        assert_eq!(config.chunking.max_size, 300);
        assert_eq!(config.chunking.unit, ChunkUnit::Characters);
    }

    #[test]
    fn env_lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("APP_TEXTSPLITTER_CHUNKSIZE", "510"),
            ("APP_TEXTSPLITTER_CHUNKOVERLAP", "200"),
            ("APP_RETRIEVER_TOPK", "6"),
            ("APP_RETRIEVER_SCORETHRESHOLD", "0.4"),
            ("APP_EMBEDDINGS_MODELNAME", "snowflake/arctic-embed-l"),
        ]);
        let config = RagConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.chunking.max_size, 510);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.retrieval.score_threshold, Some(0.4));
        assert_eq!(config.embedding.model, "snowflake/arctic-embed-l");
    }

    #[test]
    fn env_lookup_reads_model_endpoints() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("APP_LLM_SERVERURL", "http://llm:8000/v1"),
            ("APP_LLM_MODELNAME", "meta/llama3-70b-instruct"),
            ("APP_LLM_TEMPERATURE", "0.5"),
            ("APP_RANKING_SERVERURL", "http://ranking:8000/v1"),
        ]);
        let config = RagConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.llm.base_url.as_deref(), Some("http://llm:8000/v1"));
        assert_eq!(config.llm.model, "meta/llama3-70b-instruct");
        assert_eq!(config.llm.temperature, 0.5);
        assert_eq!(config.ranking.base_url.as_deref(), Some("http://ranking:8000/v1"));
        assert_eq!(config.ranking.model, RankingConfig::default().model);
    }

    #[test]
    fn rejects_zero_retry_attempts() {
        let mut config = RagConfig::default();
        config.ranking.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_lookup_reports_unparseable_values() {
        let err = RagConfig::from_lookup(|k| {
            (k == "APP_RETRIEVER_TOPK").then(|| "four".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("APP_RETRIEVER_TOPK"));
    }
}
