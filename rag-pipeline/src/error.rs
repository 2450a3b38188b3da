//! Error types for the `rag-pipeline` crate.

use thiserror::Error;

/// Errors that can occur in ingestion and retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// Configuration parameters are inconsistent (for example a chunk overlap
    /// that is not smaller than the chunk size).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The document loader does not handle the declared MIME type.
    #[error("Unsupported document type: {mime_type}")]
    UnsupportedDocumentType {
        /// The MIME type that was declared or guessed.
        mime_type: String,
    },

    /// The embedding endpoint could not produce vectors, either after all
    /// retry attempts were exhausted or because of a non-retryable failure.
    #[error("Embedding unavailable ({model}) after {attempts} attempt(s): {message}")]
    EmbeddingUnavailable {
        /// The model the batch was sent to.
        model: String,
        /// Attempts made for the failing sub-request.
        attempts: u32,
        /// The last failure reported by the provider.
        message: String,
    },

    /// A single request to an external model endpoint failed.
    #[error("Provider request failed ({provider}): {message}")]
    ProviderRequest {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Whether retrying the same request may succeed.
        transient: bool,
    },

    /// The named collection does not exist in the vector store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// A collection with the same name but a different configuration exists.
    #[error("Collection '{0}' already exists with a different configuration")]
    CollectionConflict(String),

    /// A vector does not have the dimensionality the collection expects.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The collection's configured dimensionality.
        expected: usize,
        /// The dimensionality that was supplied.
        actual: usize,
    },

    /// An embedding was produced by a different model than the collection's.
    #[error(
        "Embedding model mismatch in collection '{collection}': expected {expected}, got {actual}"
    )]
    ModelMismatch {
        /// The collection name.
        collection: String,
        /// The collection's configured model.
        expected: String,
        /// The model that produced the offending embedding.
        actual: String,
    },

    /// No document with the given identifier is known.
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// The source could be read but its content could not be turned into text.
    #[error("Failed to load document {source_name}: {message}")]
    DocumentLoad {
        /// Path or URL of the source.
        source_name: String,
        /// A description of the failure.
        message: String,
    },

    /// One or more documents in a bulk ingestion failed.
    #[error("{} document(s) failed to ingest, {succeeded} succeeded", failures.len())]
    IngestionPartialFailure {
        /// `(source, error message)` for every failed document.
        failures: Vec<(String, String)>,
        /// Number of documents ingested successfully.
        succeeded: usize,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    Reranker {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// The completion model failed to produce an answer.
    #[error("Completion error ({model}): {message}")]
    Completion {
        /// The model that was called.
        model: String,
        /// A description of the failure.
        message: String,
    },

    /// The query and fixed prompt text alone exceed the prompt budget.
    #[error("Prompt requires {required} characters but the budget is {budget}")]
    PromptTooLarge {
        /// Characters needed without any retrieved context.
        required: usize,
        /// The configured maximum.
        budget: usize,
    },

    /// The operation did not finish within the configured time limit.
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    /// An I/O error while reading sources or snapshots.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A (de)serialization error.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether retrying the failed operation may succeed.
    ///
    /// Only provider-level failures flagged as transient (network errors,
    /// rate limiting, server errors) qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, RagError::ProviderRequest { transient: true, .. })
    }
}

/// A convenience result type for pipeline operations.
pub type Result<T> = std::result::Result<T, RagError>;
