//! Data types for documents, chunks, collections, queries and search results.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a document during ingestion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IngestionState {
    /// Registered, nothing processed yet.
    Pending,
    /// Split into chunks; embedding is in progress or was interrupted.
    Chunked,
    /// Every chunk is embedded and stored.
    Embedded,
    /// Ingestion stopped with an error.
    Failed,
}

impl fmt::Display for IngestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestionState::Pending => "pending",
            IngestionState::Chunked => "chunked",
            IngestionState::Embedded => "embedded",
            IngestionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Chunk metadata key holding the fingerprint of the document text.
pub const CONTENT_HASH_KEY: &str = "content_hash";

/// Derive the identifier of the document at `source` inside `collection`.
///
/// The identifier is a name-based UUID, so uploading the same source to the
/// same collection twice resolves to the same document.
pub fn document_id(collection: &str, source: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, format!("{collection}/{source}").as_bytes()).to_string()
}

/// A source document containing text content and metadata.
///
/// Its lifecycle state is tracked by the pipeline, see
/// [`RagPipeline::status`](crate::RagPipeline::status).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// File path or URL the text was loaded from.
    pub source: String,
    /// The collection the document belongs to.
    pub collection: String,
    /// MIME type the text was extracted from.
    pub mime_type: String,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
}

impl Document {
    /// Create a document with a derived identifier.
    pub fn new(
        collection: impl Into<String>,
        source: impl Into<String>,
        mime_type: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let collection = collection.into();
        let source = source.into();
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), source.clone());
        Self {
            id: document_id(&collection, &source),
            source,
            collection,
            mime_type: mime_type.into(),
            text: text.into(),
            metadata,
        }
    }

    /// Add metadata entries, overwriting existing keys.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata.extend(metadata);
        self
    }
}

/// Structural role of a chunk inside its document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkLabel {
    /// Starts with a section heading.
    Heading,
    /// Mostly tabular rows.
    Table,
    /// A figure or image caption.
    ImageCaption,
}

/// A contiguous span of a [`Document`]'s text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier, `{document_id}_{index}`.
    pub id: String,
    /// The ID of the parent [`Document`].
    pub document_id: String,
    /// Position of the chunk within the document.
    pub index: usize,
    /// The text content of the chunk.
    pub text: String,
    /// Character offset of the first character in the source text.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
    /// Optional structural label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<ChunkLabel>,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Build the identifier of chunk `index` of `document_id`.
    pub fn make_id(document_id: &str, index: usize) -> String {
        format!("{document_id}_{index}")
    }

    /// The source attribution stored in the chunk metadata, if any.
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").map(String::as_str)
    }

    /// Fingerprint of the document text this chunk was cut from, if recorded.
    pub fn content_hash(&self) -> Option<&str> {
        self.metadata.get(CONTENT_HASH_KEY).map(String::as_str)
    }
}

/// A vector representation of a chunk produced by a named model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embedding {
    /// The vector components.
    pub values: Vec<f32>,
    /// Name (and version) of the model that produced the vector.
    pub model: String,
}

/// A chunk paired with its embedding, ready for storage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddedChunk {
    /// The chunk.
    pub chunk: Chunk,
    /// The chunk's embedding.
    pub embedding: Embedding,
}

/// How similarity between two vectors is scored.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Cosine of the angle between the vectors.
    #[default]
    Cosine,
    /// Raw dot product, for models that emit normalized vectors.
    InnerProduct,
}

impl SimilarityMetric {
    /// Score `a` against `b`. Returns 0.0 for zero-magnitude vectors under cosine.
    pub fn score(self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        match self {
            SimilarityMetric::InnerProduct => dot,
            SimilarityMetric::Cosine => {
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 0.0;
                }
                dot / (norm_a * norm_b)
            }
        }
    }
}

/// A named, independently configured partition of the vector store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionConfig {
    /// Collection name.
    pub name: String,
    /// The only model whose embeddings the collection accepts.
    pub embedding_model: String,
    /// Vector dimensionality.
    pub dimensions: usize,
    /// Similarity metric used by search.
    #[serde(default)]
    pub metric: SimilarityMetric,
}

impl CollectionConfig {
    /// Create a cosine-scored collection configuration.
    pub fn new(
        name: impl Into<String>,
        embedding_model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            name: name.into(),
            embedding_model: embedding_model.into(),
            dimensions,
            metric: SimilarityMetric::Cosine,
        }
    }

    /// Use `metric` for search.
    pub fn with_metric(mut self, metric: SimilarityMetric) -> Self {
        self.metric = metric;
        self
    }
}

/// A user question, optionally with a summary of the conversation so far.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    /// The literal user text.
    pub text: String,
    /// Summary of earlier turns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_summary: Option<String>,
}

impl Query {
    /// A query without conversation history.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), history_summary: None }
    }

    /// Attach a conversation summary.
    pub fn with_history(mut self, summary: impl Into<String>) -> Self {
        self.history_summary = Some(summary.into());
        self
    }

    /// The text that is embedded for retrieval.
    pub(crate) fn embedding_input(&self) -> String {
        match &self.history_summary {
            Some(summary) if !summary.trim().is_empty() => format!("{summary}\n\n{}", self.text),
            _ => self.text.clone(),
        }
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::new(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::new(text)
    }
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_stable_per_collection_and_source() {
        assert_eq!(document_id("docs", "a.txt"), document_id("docs", "a.txt"));
        assert_ne!(document_id("docs", "a.txt"), document_id("docs", "b.txt"));
        assert_ne!(document_id("docs", "a.txt"), document_id("other", "a.txt"));
    }

    #[test]
    fn new_document_carries_source_metadata() {
        let doc = Document::new("docs", "guide.md", "text/markdown", "hello");
        assert_eq!(doc.id, document_id("docs", "guide.md"));
        assert_eq!(doc.metadata.get("source").map(String::as_str), Some("guide.md"));
    }

    #[test]
    fn cosine_and_inner_product_scores() {
        let a = [1.0, 0.0];
        let b = [2.0, 0.0];
        assert!((SimilarityMetric::Cosine.score(&a, &b) - 1.0).abs() < 1e-6);
        assert!((SimilarityMetric::InnerProduct.score(&a, &b) - 2.0).abs() < 1e-6);
        assert_eq!(SimilarityMetric::Cosine.score(&a, &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn query_embedding_input_prepends_history() {
        let q = Query::new("what is a TDP?").with_history("We talked about GPUs.");
        assert_eq!(q.embedding_input(), "We talked about GPUs.\n\nwhat is a TDP?");
        assert_eq!(Query::new("plain").embedding_input(), "plain");
    }
}
