//! # RAG Basic Example
//!
//! Demonstrates the core RAG pipeline: ingest documents, then query them
//! and assemble a grounded prompt.
//!
//! Uses `InMemoryVectorStore` and a deterministic bag-of-words
//! `MockEmbeddingProvider` so it runs with **zero API keys**.
//!
//! Run: `cargo run -p rag-demos --example rag_basic`

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rag_pipeline::{
    EmbeddingConfig, EmbeddingProvider, InMemoryVectorStore, IngestRequest, InputType, Query,
    RagConfig, RagPipeline, TracingObserver,
};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// MockEmbeddingProvider — hashed bag-of-words embeddings for demos
// ---------------------------------------------------------------------------

struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str, _input_type: InputType) -> rag_pipeline::Result<Vec<f32>> {
        // Every lowercase word adds weight to one hashed bucket, so texts
        // sharing vocabulary end up pointing in similar directions.
        let mut emb = vec![0.0f32; self.dimensions];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            emb[(hasher.finish() % self.dimensions as u64) as usize] += 1.0;
        }
        // L2-normalise so cosine similarity is just the dot product.
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
        self.dimensions
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // -- 1. Configure the pipeline ----------------------------------------
    // chunk_size=200 keeps chunks small for this demo; overlap=50 shares
    // context between adjacent chunks; top_k=3 returns at most three chunks.
    let config = RagConfig::builder()
        .embedding(EmbeddingConfig {
            model: "mock-bag-of-words".into(),
            dimensions: 256,
            ..EmbeddingConfig::default()
        })
        .chunk_size(200)
        .chunk_overlap(50)
        .min_chunk_size(20)
        .top_k(3)
        .score_threshold(0.2)
        .build()?;

    // -- 2. Build the pipeline with in-memory components ------------------
    let pipeline = RagPipeline::builder()
        .config(config)
        .embedding_provider(Arc::new(MockEmbeddingProvider::new(256)))
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .observer(Arc::new(TracingObserver))
        .build()?;

    // -- 3. Create a collection -------------------------------------------
    let collection = "knowledge_base";
    pipeline.create_collection(collection).await?;

    // -- 4. Ingest sample documents ---------------------------------------
    let documents = vec![
        IngestRequest::text(
            "https://www.rust-lang.org",
            "Rust is a systems programming language focused on safety, speed, \
             and concurrency. It achieves memory safety without a garbage collector \
             through its ownership system.",
        ),
        IngestRequest::text(
            "https://www.python.org",
            "Python is a high-level, interpreted programming language known for \
             its readability and versatility. It is widely used in data science, \
             web development, and automation.",
        ),
        IngestRequest::text(
            "notes/rag.md",
            "Retrieval-Augmented Generation (RAG) combines a retrieval system \
             with a language model. Documents are chunked, embedded, and stored \
             in a vector database. At query time the most relevant chunks are \
             retrieved and fed to the language model as context.",
        ),
    ];

    println!("Ingesting {} documents...", documents.len());
    for summary in pipeline.ingest_batch(collection, documents).await.into_result()? {
        println!("  {} → {} chunk(s)", summary.source, summary.chunk_count);
    }

    // Re-ingesting unchanged content is a no-op.
    let again = pipeline
        .ingest_document(
            collection,
            IngestRequest::text(
                "https://www.python.org",
                "Python is a high-level, interpreted programming language known for \
                 its readability and versatility. It is widely used in data science, \
                 web development, and automation.",
            ),
        )
        .await?;
    println!("Re-ingest of {} skipped: {}", again.source, again.skipped);

    // -- 5. Query the pipeline --------------------------------------------
    let queries = [
        "memory safety without a garbage collector",
        "data science language",
        "zebra migration",
    ];

    for query in &queries {
        println!("\nQuery: \"{query}\"");
        let results = pipeline.query(collection, *query).await?;
        if results.is_empty() {
            println!("  (no results)");
        } else {
            for (i, result) in results.iter().enumerate() {
                let preview: String = result.chunk.text.chars().take(80).collect();
                println!(
                    "  {}. [score={:.4}] source={} | {}",
                    i + 1,
                    result.score,
                    result.chunk.source().unwrap_or("?"),
                    preview,
                );
            }
        }
    }

    // -- 6. Assemble a prompt ---------------------------------------------
    let query = Query::new("How does Rust achieve memory safety?")
        .with_history("The user is comparing programming languages.");
    let prompt = pipeline.prompt(collection, query).await?;
    println!(
        "\nPrompt ({} chars, {} source(s)):\n{}",
        prompt.char_len(),
        prompt.sources.len(),
        prompt.text()
    );

    println!("\nDone.");
    Ok(())
}
