//! Reranker trait for re-scoring search results.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::document::SearchResult;
use crate::error::Result;

/// A reranker that re-scores and reorders search results.
///
/// Implementations can use cross-encoder models, LLM-based scoring, or
/// other strategies to improve precision beyond initial vector similarity.
/// The returned order is final; the retriever only truncates it.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank search results given the original query.
    ///
    /// Returns results in a new order with potentially updated scores.
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}

/// A no-op reranker that returns results unchanged.
///
/// Useful as a default when no reranking is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        Ok(results)
    }
}

/// Boosts results by the fraction of query terms that appear in the chunk.
///
/// Terms are lowercase alphanumeric runs longer than two characters. The new
/// score is `score + weight * matched / total`. Sorting is stable, so results
/// with equal boosted scores keep their incoming order.
#[derive(Debug, Clone, Copy)]
pub struct TermOverlapReranker {
    weight: f32,
}

impl TermOverlapReranker {
    /// Create a reranker adding at most `weight` to each score.
    pub fn new(weight: f32) -> Self {
        Self { weight }
    }
}

impl Default for TermOverlapReranker {
    fn default() -> Self {
        Self::new(0.5)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Reranker for TermOverlapReranker {
    async fn rerank(
        &self,
        query: &str,
        mut results: Vec<SearchResult>,
    ) -> Result<Vec<SearchResult>> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Ok(results);
        }

        for result in &mut results {
            let chunk_terms = terms(&result.chunk.text);
            let matched = query_terms.intersection(&chunk_terms).count();
            result.score += self.weight * matched as f32 / query_terms.len() as f32;
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(results)
    }
}
