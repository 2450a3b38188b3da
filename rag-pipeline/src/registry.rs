//! Lifecycle tracking for ingested documents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::document::IngestionState;

/// What the pipeline knows about one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentRecord {
    /// Document identifier.
    pub document_id: String,
    /// Collection the document was ingested into.
    pub collection: String,
    /// File path or URL of the source.
    pub source: String,
    /// MIME type of the source.
    pub mime_type: String,
    /// Current lifecycle state.
    pub state: IngestionState,
    /// SHA-256 of the ingested text, hex encoded.
    pub content_hash: String,
    /// Number of chunks the document was split into.
    pub chunk_count: usize,
    /// Index of the last chunk known to be stored.
    pub last_upserted: Option<usize>,
    /// Error message of the last failed attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time of the last state change.
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Index of the first chunk that still needs to be stored.
    pub fn resume_index(&self) -> usize {
        self.last_upserted.map_or(0, |i| i + 1)
    }
}

/// Hex-encoded SHA-256 of `text`.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// In-memory table of [`DocumentRecord`]s keyed by document ID.
#[derive(Debug, Default)]
pub struct DocumentRegistry {
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl DocumentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record.
    pub async fn get(&self, document_id: &str) -> Option<DocumentRecord> {
        self.records.read().await.get(document_id).cloned()
    }

    /// Insert or replace a record.
    pub async fn put(&self, record: DocumentRecord) {
        self.records.write().await.insert(record.document_id.clone(), record);
    }

    /// Apply `f` to a record and refresh its timestamp. Returns `false` if
    /// the record does not exist.
    pub async fn update<F>(&self, document_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut DocumentRecord),
    {
        let mut records = self.records.write().await;
        match records.get_mut(document_id) {
            Some(record) => {
                f(record);
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// Remove a record.
    pub async fn remove(&self, document_id: &str) -> Option<DocumentRecord> {
        self.records.write().await.remove(document_id)
    }

    /// Remove every record of a collection. Returns how many were removed.
    pub async fn remove_collection(&self, collection: &str) -> usize {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.collection != collection);
        before - records.len()
    }

    /// Records of a collection, sorted by source.
    pub async fn list(&self, collection: &str) -> Vec<DocumentRecord> {
        let records = self.records.read().await;
        let mut list: Vec<DocumentRecord> =
            records.values().filter(|r| r.collection == collection).cloned().collect();
        list.sort_by(|a, b| a.source.cmp(&b.source));
        list
    }
}
