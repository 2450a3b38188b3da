//! # RAG Remote Example
//!
//! Answers a question from local files using hosted model endpoints:
//! an embedding service, an optional ranking service and an
//! OpenAI-compatible chat completion service.
//!
//! Configuration is read from `APP_*` environment variables (a `.env` file
//! is honoured):
//!
//! - `APP_EMBEDDINGS_SERVERURL`, `APP_EMBEDDINGS_MODELNAME`,
//!   `APP_EMBEDDINGS_DIMENSIONS`
//! - `APP_RANKING_SERVERURL`, `APP_RANKING_MODELNAME` (optional)
//! - `APP_LLM_SERVERURL`, `APP_LLM_MODELNAME`, `APP_LLM_TEMPERATURE`,
//!   `APP_LLM_MAXTOKENS`
//! - `APP_API_KEY` (optional bearer token)
//!
//! The answer is printed as it streams in.
//!
//! Run:
//! `cargo run -p rag-demos --example rag_remote --features http -- "question" a.md b.html`

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use rag_pipeline::{
    HttpCompletionModel, HttpEmbeddingProvider, HttpReranker, InMemoryVectorStore, RagConfig,
    RagPipeline, TracingObserver,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let question = args.next().context("usage: rag_remote <question> <file>...")?;
    let paths: Vec<PathBuf> = args.map(PathBuf::from).collect();

    let config = RagConfig::from_env()?;
    let embedder = HttpEmbeddingProvider::from_config(&config.embedding)?;
    let llm = HttpCompletionModel::from_config(&config.llm)?;
    let reranker = match &config.ranking.base_url {
        Some(_) => Some(HttpReranker::from_config(&config.ranking)?),
        None => None,
    };

    let mut builder = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(embedder))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .completion_model(Arc::new(llm))
        .observer(Arc::new(TracingObserver));
    if let Some(reranker) = reranker {
        builder = builder.reranker(Arc::new(reranker));
    }
    let pipeline = builder.build()?;

    let collection = "remote";
    pipeline.create_collection(collection).await?;
    let summaries = pipeline.ingest_paths(collection, &paths).await.into_result()?;
    println!("Ingested {} document(s)", summaries.len());

    let mut answer = pipeline.answer_stream(collection, question.as_str()).await?;
    println!();
    while let Some(piece) = answer.tokens.next().await {
        print!("{}", piece?);
        std::io::stdout().flush()?;
    }
    println!("\n");
    for (i, source) in answer.sources.iter().enumerate() {
        println!(
            "[{}] {} (score {:.3})",
            i + 1,
            source.source.as_deref().unwrap_or(&source.document_id),
            source.score
        );
    }
    Ok(())
}
