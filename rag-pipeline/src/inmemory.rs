//! In-memory vector store with brute-force similarity search.
//!
//! This module provides [`InMemoryVectorStore`], a vector store backed by a
//! `HashMap` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, testing, and small collections, and can be snapshotted to a
//! JSON file and loaded back.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::{Chunk, CollectionConfig, EmbeddedChunk, Embedding, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{SearchParams, VectorStore};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    /// Insertion sequence number, kept across replacements of the same chunk.
    seq: u64,
    chunk: Chunk,
    embedding: Embedding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CollectionData {
    config: CollectionConfig,
    entries: HashMap<String, StoredEntry>,
    next_seq: u64,
}

impl CollectionData {
    fn new(config: CollectionConfig) -> Self {
        Self { config, entries: HashMap::new(), next_seq: 0 }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    collections: Vec<CollectionData>,
}

/// An in-memory vector store.
///
/// Collections are stored as nested `HashMap`s: collection name → chunk ID →
/// entry. All operations are async-safe via `tokio::sync::RwLock`; the lock
/// is held only for the duration of one call.
///
/// # Example
///
/// ```rust,ignore
/// use rag_pipeline::{CollectionConfig, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection(CollectionConfig::new("docs", "my-model", 384)).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, CollectionData>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every collection to `path` as JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = {
            let collections = self.collections.read().await;
            let mut data: Vec<CollectionData> = collections.values().cloned().collect();
            data.sort_by(|a, b| a.config.name.cmp(&b.config.name));
            serde_json::to_vec(&Snapshot { version: SNAPSHOT_VERSION, collections: data })?
        };
        tokio::fs::write(path.as_ref(), json).await?;
        info!(path = %path.as_ref().display(), "saved vector store snapshot");
        Ok(())
    }

    /// Load a store previously written with [`save`](Self::save).
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = tokio::fs::read(path.as_ref()).await?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RagError::InvalidConfiguration(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }
        let collections =
            snapshot.collections.into_iter().map(|c| (c.config.name.clone(), c)).collect();
        info!(path = %path.as_ref().display(), "loaded vector store snapshot");
        Ok(Self { collections: RwLock::new(collections) })
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, config: CollectionConfig) -> Result<()> {
        if config.dimensions == 0 {
            return Err(RagError::InvalidConfiguration(
                "collection dimensions must be greater than zero".to_string(),
            ));
        }
        let mut collections = self.collections.write().await;
        match collections.get(&config.name) {
            Some(existing) if existing.config == config => Ok(()),
            Some(_) => Err(RagError::CollectionConflict(config.name)),
            None => {
                debug!(
                    collection = %config.name,
                    model = %config.embedding_model,
                    "created collection"
                );
                collections.insert(config.name.clone(), CollectionData::new(config));
                Ok(())
            }
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }

    async fn collection(&self, name: &str) -> Result<CollectionConfig> {
        let collections = self.collections.read().await;
        collections
            .get(name)
            .map(|c| c.config.clone())
            .ok_or_else(|| RagError::CollectionNotFound(name.to_string()))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert(&self, collection: &str, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        for item in chunks {
            if item.embedding.model != data.config.embedding_model {
                return Err(RagError::ModelMismatch {
                    collection: collection.to_string(),
                    expected: data.config.embedding_model.clone(),
                    actual: item.embedding.model.clone(),
                });
            }
            if item.embedding.values.len() != data.config.dimensions {
                return Err(RagError::DimensionMismatch {
                    expected: data.config.dimensions,
                    actual: item.embedding.values.len(),
                });
            }
        }

        for item in chunks {
            let seq = match data.entries.get(&item.chunk.id) {
                Some(existing) => existing.seq,
                None => {
                    let seq = data.next_seq;
                    data.next_seq += 1;
                    seq
                }
            };
            data.entries.insert(
                item.chunk.id.clone(),
                StoredEntry { seq, chunk: item.chunk.clone(), embedding: item.embedding.clone() },
            );
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        params: SearchParams,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let data = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;

        if embedding.len() != data.config.dimensions {
            return Err(RagError::DimensionMismatch {
                expected: data.config.dimensions,
                actual: embedding.len(),
            });
        }
        if params.k == 0 {
            return Ok(Vec::new());
        }

        let metric = data.config.metric;
        let mut scored: Vec<(u64, f32, &StoredEntry)> = data
            .entries
            .values()
            .map(|entry| (entry.seq, metric.score(&entry.embedding.values, embedding), entry))
            .filter(|(_, score, _)| params.score_threshold.is_none_or(|t| *score >= t))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(params.k);

        Ok(scored
            .into_iter()
            .map(|(_, score, entry)| SearchResult { chunk: entry.chunk.clone(), score })
            .collect())
    }

    async fn document_chunks(&self, collection: &str, document_id: &str) -> Result<Vec<Chunk>> {
        let collections = self.collections.read().await;
        let data = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        let mut chunks: Vec<Chunk> = data
            .entries
            .values()
            .filter(|e| e.chunk.document_id == document_id)
            .map(|e| e.chunk.clone())
            .collect();
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        let before = data.entries.len();
        data.entries.retain(|_, entry| entry.chunk.document_id != document_id);
        Ok(before - data.entries.len())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.entries.len())
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))
    }

    async fn document_ids(&self, collection: &str) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let data = collections
            .get(collection)
            .ok_or_else(|| RagError::CollectionNotFound(collection.to_string()))?;
        let ids: BTreeSet<&str> =
            data.entries.values().map(|e| e.chunk.document_id.as_str()).collect();
        Ok(ids.into_iter().map(str::to_string).collect())
    }
}
