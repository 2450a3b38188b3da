//! HTTP clients against a local endpoint that fails before it answers.

#![cfg(feature = "http")]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use futures::TryStreamExt;
use rag_pipeline::{
    Chunk, CompletionModel, Embedder, EmbeddingConfig, HttpCompletionModel,
    HttpEmbeddingProvider, HttpReranker, Prompt, RagError, Reranker, RetryConfig, SearchResult,
};
use serde_json::json;

/// Requests served so far, and how many of the first ones fail.
#[derive(Clone)]
struct Flaky {
    hits: Arc<AtomicUsize>,
    failures: usize,
    status: StatusCode,
}

impl Flaky {
    fn new(failures: usize, status: StatusCode) -> Self {
        Self { hits: Arc::new(AtomicUsize::new(0)), failures, status }
    }

    /// Count the request; `Some` with the error response while failing.
    fn fail(&self) -> Option<Response> {
        let hit = self.hits.fetch_add(1, Ordering::SeqCst);
        (hit < self.failures)
            .then(|| (self.status, r#"{"error":{"message":"try later"}}"#).into_response())
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn ranking(State(flaky): State<Flaky>) -> Response {
    if let Some(failure) = flaky.fail() {
        return failure;
    }
    axum::Json(json!({"rankings": [{"index": 1, "logit": 4.0}, {"index": 0, "logit": -2.0}]}))
        .into_response()
}

async fn chat(
    State(flaky): State<Flaky>,
    axum::Json(body): axum::Json<serde_json::Value>,
) -> Response {
    if let Some(failure) = flaky.fail() {
        return failure;
    }
    if body["stream"] == json!(true) {
        let events = [
            r#"data: {"choices":[{"index":0,"delta":{"role":"assistant"}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"Thirty "}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"watts."}}]}"#,
            "data: [DONE]",
        ];
        let body: String = events.iter().map(|e| format!("{e}\n\n")).collect();
        return ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response();
    }
    let message = json!({"role": "assistant", "content": "Thirty watts."});
    axum::Json(json!({"choices": [{"index": 0, "message": message}]})).into_response()
}

async fn embeddings(State(flaky): State<Flaky>) -> Response {
    if let Some(failure) = flaky.fail() {
        return failure;
    }
    axum::Json(json!({"data": [{"index": 0, "embedding": [0.6, 0.8]}]})).into_response()
}

async fn spawn_server(flaky: Flaky) -> (String, tokio::task::JoinHandle<()>) {
    let app = Router::new()
        .route("/v1/ranking", post(ranking))
        .route("/v1/chat/completions", post(chat))
        .route("/v1/embeddings", post(embeddings))
        .with_state(flaky);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server run");
    });
    (format!("http://{addr}/v1"), handle)
}

fn fast_retry() -> RetryConfig {
    RetryConfig { max_attempts: 3, initial_backoff_ms: 1, max_backoff_ms: 5 }
}

fn prompt() -> Prompt {
    Prompt {
        system: "Answer from context.".into(),
        user: "Question: How much power does the card draw?".into(),
        sources: Vec::new(),
        dropped: 0,
        summary_included: false,
    }
}

fn candidate(id: &str) -> SearchResult {
    SearchResult {
        chunk: Chunk {
            id: id.to_string(),
            document_id: "d".to_string(),
            index: 0,
            text: format!("passage {id}"),
            start: 0,
            end: 9,
            label: None,
            metadata: HashMap::new(),
        },
        score: 0.5,
    }
}

#[tokio::test]
async fn reranker_retries_rate_limited_requests() {
    let flaky = Flaky::new(1, StatusCode::TOO_MANY_REQUESTS);
    let (base, handle) = spawn_server(flaky.clone()).await;

    let reranker = HttpReranker::new(&base, "rerank-m").unwrap().with_retry(fast_retry());
    let ranked = reranker.rerank("power", vec![candidate("a"), candidate("b")]).await.unwrap();

    let ids: Vec<&str> = ranked.iter().map(|r| r.chunk.id.as_str()).collect();
    assert_eq!(ids, vec!["b", "a"]);
    assert_eq!(flaky.hits(), 2);

    handle.abort();
}

#[tokio::test]
async fn reranker_gives_up_after_max_attempts() {
    let flaky = Flaky::new(usize::MAX, StatusCode::SERVICE_UNAVAILABLE);
    let (base, handle) = spawn_server(flaky.clone()).await;

    let reranker = HttpReranker::new(&base, "rerank-m").unwrap().with_retry(fast_retry());
    let err = reranker.rerank("power", vec![candidate("a")]).await.unwrap_err();

    assert!(matches!(err, RagError::Reranker { .. }));
    assert_eq!(flaky.hits(), 3);

    handle.abort();
}

#[tokio::test]
async fn completion_retries_server_errors() {
    let flaky = Flaky::new(2, StatusCode::BAD_GATEWAY);
    let (base, handle) = spawn_server(flaky.clone()).await;

    let model = HttpCompletionModel::new(&base, "llm").unwrap().with_retry(fast_retry());
    assert_eq!(model.complete(&prompt()).await.unwrap(), "Thirty watts.");
    assert_eq!(flaky.hits(), 3);

    handle.abort();
}

#[tokio::test]
async fn completion_does_not_retry_rejected_requests() {
    let flaky = Flaky::new(1, StatusCode::BAD_REQUEST);
    let (base, handle) = spawn_server(flaky.clone()).await;

    let model = HttpCompletionModel::new(&base, "llm").unwrap().with_retry(fast_retry());
    let err = model.complete(&prompt()).await.unwrap_err();

    assert!(matches!(
        err,
        RagError::Completion { ref message, .. } if message.contains("try later")
    ));
    assert_eq!(flaky.hits(), 1);

    handle.abort();
}

#[tokio::test]
async fn streamed_completion_yields_deltas_after_a_retry() {
    let flaky = Flaky::new(1, StatusCode::TOO_MANY_REQUESTS);
    let (base, handle) = spawn_server(flaky.clone()).await;

    let model = HttpCompletionModel::new(&base, "llm").unwrap().with_retry(fast_retry());
    let stream = model.complete_stream(&prompt()).await.unwrap();
    let pieces: Vec<String> = stream.try_collect().await.unwrap();

    assert_eq!(pieces, vec!["Thirty ", "watts."]);
    assert_eq!(flaky.hits(), 2);

    handle.abort();
}

#[tokio::test]
async fn embedder_retries_http_provider_failures() {
    let flaky = Flaky::new(1, StatusCode::SERVICE_UNAVAILABLE);
    let (base, handle) = spawn_server(flaky.clone()).await;

    let provider = HttpEmbeddingProvider::new(&base, "embed-m", 2).unwrap();
    let config = EmbeddingConfig {
        model: "embed-m".into(),
        dimensions: 2,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..EmbeddingConfig::default()
    };
    let embedder = Embedder::new(Arc::new(provider), &config);

    let embedding = embedder.embed_query("power draw").await.unwrap();
    assert_eq!(embedding.values, vec![0.6, 0.8]);
    assert_eq!(flaky.hits(), 2);

    handle.abort();
}
