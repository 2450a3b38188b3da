use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{api_key_from_env, endpoint, parse_error, post_json};
use crate::config::{RankingConfig, RetryConfig};
use crate::document::SearchResult;
use crate::error::{RagError, Result};
use crate::reranker::Reranker;
use crate::retry::retry;

const PROVIDER: &str = "http-ranking";

/// A [`Reranker`] calling a `/ranking` endpoint.
///
/// Each candidate's score is replaced by the returned logit and candidates
/// are ordered by descending logit. Candidates the endpoint does not rank
/// are dropped. Requests failing with a transient error are retried with
/// exponential backoff.
pub struct HttpReranker {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    retry: RetryConfig,
}

impl HttpReranker {
    /// Create a reranker for `model` served at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self> {
        if base_url.is_empty() {
            return Err(RagError::InvalidConfiguration(
                "ranking base URL must not be empty".into(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            url: endpoint(base_url, "ranking"),
            model: model.into(),
            api_key: api_key_from_env(),
            retry: RetryConfig::default(),
        })
    }

    /// Create a reranker from the `ranking` section of the configuration.
    pub fn from_config(config: &RankingConfig) -> Result<Self> {
        let base_url = config.base_url.as_deref().ok_or_else(|| {
            RagError::InvalidConfiguration(
                "ranking.base_url is required for the HTTP reranker".into(),
            )
        })?;
        Ok(Self::new(base_url, config.model.clone())?.with_retry(config.retry))
    }

    /// Set the bearer token.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the retry policy for transient failures.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Serialize)]
struct RankingRequest<'a> {
    model: &'a str,
    query: TextItem<'a>,
    passages: Vec<TextItem<'a>>,
}

#[derive(Serialize)]
struct TextItem<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct RankingResponse {
    rankings: Vec<Ranking>,
}

#[derive(Deserialize)]
struct Ranking {
    index: usize,
    logit: f32,
}

fn apply_rankings(results: Vec<SearchResult>, mut rankings: Vec<Ranking>) -> Vec<SearchResult> {
    rankings.sort_by(|a, b| b.logit.total_cmp(&a.logit));
    let mut slots: Vec<Option<SearchResult>> = results.into_iter().map(Some).collect();
    rankings
        .into_iter()
        .filter_map(|r| {
            slots.get_mut(r.index).and_then(Option::take).map(|mut result| {
                result.score = r.logit;
                result
            })
        })
        .collect()
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        if results.is_empty() {
            return Ok(results);
        }
        debug!(provider = PROVIDER, model = %self.model, candidates = results.len(), "reranking");

        let body = RankingRequest {
            model: &self.model,
            query: TextItem { text: query },
            passages: results.iter().map(|r| TextItem { text: &r.chunk.text }).collect(),
        };
        let to_reranker_error = |message: String| RagError::Reranker {
            reranker: self.model.clone(),
            message,
        };
        let (result, attempts) = retry(&self.retry, PROVIDER, || {
            post_json(&self.client, &self.url, self.api_key.as_deref(), PROVIDER, &body)
        })
        .await;
        let response =
            result.map_err(|e| to_reranker_error(format!("{e} (after {attempts} attempt(s))")))?;
        let parsed: RankingResponse = response
            .json()
            .await
            .map_err(|e| to_reranker_error(parse_error(PROVIDER, e).to_string()))?;

        Ok(apply_rankings(results, parsed.rankings))
    }
}
