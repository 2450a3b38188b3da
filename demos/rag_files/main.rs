//! # RAG Files Example
//!
//! Ingests every file in a directory (text, markdown, HTML and, with the
//! `pdf` feature, PDF), reports per-file outcomes, lists the tracked
//! documents and writes the vector store to a JSON snapshot.
//!
//! Unsupported files are reported as failures without stopping the rest.
//! Runs offline with a deterministic mock embedder.
//!
//! Run: `cargo run -p rag-demos --example rag_files -- ./docs`

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Arc;

use rag_pipeline::{
    EmbeddingConfig, EmbeddingProvider, InMemoryVectorStore, InputType, RagConfig, RagPipeline,
    VectorStore,
};
use tracing_subscriber::EnvFilter;

const DIMENSIONS: usize = 384;

struct MockEmbeddingProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str, _input_type: InputType) -> rag_pipeline::Result<Vec<f32>> {
        let mut emb = vec![0.0f32; DIMENSIONS];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            emb[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
        }
        let norm: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            emb.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(emb)
    }

    fn model(&self) -> &str {
        "mock-bag-of-words"
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let dir = PathBuf::from(std::env::args().nth(1).unwrap_or_else(|| ".".to_string()));
    let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let config = RagConfig::builder()
        .embedding(EmbeddingConfig {
            model: "mock-bag-of-words".into(),
            dimensions: DIMENSIONS,
            ..EmbeddingConfig::default()
        })
        .build()?;

    let store = Arc::new(InMemoryVectorStore::new());
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(MockEmbeddingProvider))
        .vector_store(store.clone())
        .build()?;

    let collection = "files";
    pipeline.create_collection(collection).await?;

    println!("Ingesting {} file(s) from {}...", paths.len(), dir.display());
    let report = pipeline.ingest_paths(collection, &paths).await;
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => println!("  ok     {} ({} chunks)", outcome.source, summary.chunk_count),
            Err(e) => println!("  failed {}: {e}", outcome.source),
        }
    }
    let failed = report.outcomes.len() - report.succeeded();
    println!("{} succeeded, {} failed", report.succeeded(), failed);

    println!("\nTracked documents:");
    for record in pipeline.documents(collection).await? {
        println!(
            "  {} [{}] {} chunk(s) {}",
            record.source, record.state, record.chunk_count, record.mime_type
        );
    }

    let snapshot = std::env::temp_dir().join("rag-files-snapshot.json");
    store.save(&snapshot).await?;
    let restored = InMemoryVectorStore::load(&snapshot).await?;
    println!(
        "\nSnapshot written to {} ({} chunks restored)",
        snapshot.display(),
        restored.count(collection).await?
    );

    Ok(())
}
