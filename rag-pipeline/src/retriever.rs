//! Query-time retrieval: embed, search, deduplicate, rerank.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::config::RetrievalConfig;
use crate::document::{Query, SearchResult};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::observer::{Observers, Stage, StageContext};
use crate::reranker::Reranker;
use crate::vectorstore::{SearchParams, VectorStore};

/// Retrieves the most relevant chunks of a collection for a query.
///
/// The score threshold applies to vector similarity, before reranking. When
/// a reranker is configured, `candidate_k` candidates (default four times
/// `top_k`) are fetched and the reranker's order is final. Retrieval never
/// writes to the store.
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    store: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn Reranker>>,
    config: RetrievalConfig,
    observers: Observers,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("embedder", &self.embedder)
            .field("reranker", &self.reranker.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Retriever {
    /// Create a retriever without a reranker.
    pub fn new(embedder: Embedder, store: Arc<dyn VectorStore>, config: RetrievalConfig) -> Self {
        Self { embedder, store, reranker: None, config, observers: Observers::default() }
    }

    /// Rerank candidates with `reranker`.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Report stages to `observers`.
    pub fn with_observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    /// The retrieval configuration.
    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// How many candidates are fetched from the store for `top_k` results.
    pub fn candidate_k(&self, top_k: usize) -> usize {
        let default = if self.reranker.is_some() {
            top_k.saturating_mul(4)
        } else if self.config.deduplicate {
            top_k.saturating_mul(2)
        } else {
            top_k
        };
        self.config.candidate_k.unwrap_or(default).max(top_k)
    }

    /// Retrieve up to `top_k` chunks from `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CollectionNotFound`] for an unknown collection and
    /// [`RagError::ModelMismatch`] if the collection was indexed with a
    /// different embedding model.
    pub async fn retrieve(&self, collection: &str, query: &Query) -> Result<Vec<SearchResult>> {
        self.retrieve_top_k(collection, query, self.config.top_k).await
    }

    /// Like [`retrieve`](Self::retrieve) with an explicit result count.
    pub async fn retrieve_top_k(
        &self,
        collection: &str,
        query: &Query,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        let info = self.store.collection(collection).await?;
        if info.embedding_model != self.embedder.model() {
            return Err(RagError::ModelMismatch {
                collection: collection.to_string(),
                expected: info.embedding_model,
                actual: self.embedder.model().to_string(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let input = query.embedding_input();
        let embedding = self
            .observers
            .observe(
                StageContext::new(Stage::Embed).collection(collection).items(1),
                self.embedder.embed_query(&input),
            )
            .await?;

        let params = SearchParams {
            k: self.candidate_k(top_k),
            score_threshold: self.config.score_threshold,
        };
        let mut results = self
            .observers
            .observe(
                StageContext::new(Stage::Search).collection(collection).items(params.k),
                self.store.search(collection, &embedding.values, params),
            )
            .await?;

        if self.config.deduplicate {
            let mut seen = HashSet::new();
            results.retain(|r| seen.insert(r.chunk.text.clone()));
        }

        if let Some(reranker) = &self.reranker {
            let candidates = results.len();
            results = self
                .observers
                .observe(
                    StageContext::new(Stage::Rerank).collection(collection).items(candidates),
                    reranker.rerank(&query.text, results),
                )
                .await?;
        }

        results.truncate(top_k);
        info!(collection, top_k, result_count = results.len(), "retrieval completed");
        Ok(results)
    }
}
