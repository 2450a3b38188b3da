//! Vector store trait for storing and searching chunk embeddings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, CollectionConfig, EmbeddedChunk, SearchResult};
use crate::error::Result;

/// Parameters of a similarity search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchParams {
    /// Maximum number of results.
    pub k: usize,
    /// Minimum score a result must reach, if any.
    pub score_threshold: Option<f32>,
}

impl SearchParams {
    /// Search for the `k` best results without a threshold.
    pub fn top_k(k: usize) -> Self {
        Self { k, score_threshold: None }
    }

    /// Keep only results scoring at least `threshold`.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = Some(threshold);
        self
    }
}

/// A storage backend for chunk embeddings with similarity search.
///
/// Implementations manage named collections, each bound to one embedding
/// model and dimensionality. Every operation on a collection that does not
/// exist fails with [`RagError::CollectionNotFound`](crate::RagError::CollectionNotFound).
///
/// # Example
///
/// ```rust,ignore
/// use rag_pipeline::{CollectionConfig, InMemoryVectorStore, SearchParams, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection(CollectionConfig::new("docs", "my-model", 384)).await?;
/// store.upsert("docs", &embedded_chunks).await?;
/// let results = store.search("docs", &query_embedding, SearchParams::top_k(5)).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a collection. No-op if an identical one exists.
    ///
    /// Fails with [`RagError::CollectionConflict`](crate::RagError::CollectionConflict)
    /// if a collection with the same name but another model, dimensionality
    /// or metric exists.
    async fn create_collection(&self, config: CollectionConfig) -> Result<()>;

    /// Delete a collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Return a collection's configuration.
    async fn collection(&self, name: &str) -> Result<CollectionConfig>;

    /// Names of all collections, sorted.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Insert or replace chunks, keyed by chunk ID.
    ///
    /// Every embedding must come from the collection's model and have its
    /// dimensionality; otherwise nothing is written.
    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Return up to `params.k` results ordered by descending score, ties
    /// broken by insertion order, filtered by `params.score_threshold`.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        params: SearchParams,
    ) -> Result<Vec<SearchResult>>;

    /// Stored chunks of one document ordered by index, without embeddings.
    async fn document_chunks(&self, collection: &str, document_id: &str) -> Result<Vec<Chunk>>;

    /// Remove every chunk of a document. Returns the number removed.
    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize>;

    /// Number of chunks stored in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// IDs of the documents with at least one stored chunk, sorted.
    async fn document_ids(&self, collection: &str) -> Result<Vec<String>>;
}
