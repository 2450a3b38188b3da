//! Deterministic providers shared by the integration tests.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rag_pipeline::{
    CompletionModel, EmbeddingConfig, EmbeddingProvider, InMemoryVectorStore, InputType, Prompt,
    RagConfig, RagError, RagPipeline, Result, TokenStream,
};

pub const MODEL: &str = "hash-bow-v1";
pub const DIMS: usize = 512;

fn terms(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// Hashed bag-of-words embedding: texts sharing words point the same way,
/// texts with disjoint vocabularies are (almost always) orthogonal.
pub fn bag_of_words(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    for term in terms(text) {
        let mut hasher = DefaultHasher::new();
        term.hash(&mut hasher);
        v[(hasher.finish() % dims as u64) as usize] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

/// Deterministic embedder counting batch calls.
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
    pub embedded: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str, _input_type: InputType) -> Result<Vec<f32>> {
        Ok(bag_of_words(text, DIMS))
    }

    async fn embed_batch(&self, texts: &[&str], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| bag_of_words(t, DIMS)).collect())
    }

    fn model(&self) -> &str {
        MODEL
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Fails the first `failures` batch calls with a transient error.
pub struct FlakyEmbedder {
    failures: u32,
    pub attempts: AtomicU32,
}

impl FlakyEmbedder {
    pub fn new(failures: u32) -> Self {
        Self { failures, attempts: AtomicU32::new(0) }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedder {
    async fn embed(&self, text: &str, _input_type: InputType) -> Result<Vec<f32>> {
        Ok(bag_of_words(text, DIMS))
    }

    async fn embed_batch(&self, texts: &[&str], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(RagError::ProviderRequest {
                provider: "flaky".into(),
                message: "503 Service Unavailable".into(),
                transient: true,
            });
        }
        Ok(texts.iter().map(|t| bag_of_words(t, DIMS)).collect())
    }

    fn model(&self) -> &str {
        MODEL
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Fails every call permanently while `broken` is set, after letting
/// `healthy_calls` batch calls through.
pub struct BreakingEmbedder {
    healthy_calls: usize,
    pub calls: AtomicUsize,
    pub broken: AtomicBool,
}

impl BreakingEmbedder {
    pub fn new(healthy_calls: usize) -> Self {
        Self { healthy_calls, calls: AtomicUsize::new(0), broken: AtomicBool::new(true) }
    }

    pub fn repair(&self) {
        self.broken.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl EmbeddingProvider for BreakingEmbedder {
    async fn embed(&self, text: &str, _input_type: InputType) -> Result<Vec<f32>> {
        Ok(bag_of_words(text, DIMS))
    }

    async fn embed_batch(&self, texts: &[&str], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken.load(Ordering::SeqCst) && call >= self.healthy_calls {
            return Err(RagError::ProviderRequest {
                provider: "breaking".into(),
                message: "400 Bad Request".into(),
                transient: false,
            });
        }
        Ok(texts.iter().map(|t| bag_of_words(t, DIMS)).collect())
    }

    fn model(&self) -> &str {
        MODEL
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Permanently rejects any batch containing the word `poison`.
#[derive(Default)]
pub struct PoisonEmbedder;

#[async_trait]
impl EmbeddingProvider for PoisonEmbedder {
    async fn embed(&self, text: &str, _input_type: InputType) -> Result<Vec<f32>> {
        Ok(bag_of_words(text, DIMS))
    }

    async fn embed_batch(&self, texts: &[&str], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(RagError::ProviderRequest {
                provider: "poison".into(),
                message: "input rejected".into(),
                transient: false,
            });
        }
        Ok(texts.iter().map(|t| bag_of_words(t, DIMS)).collect())
    }

    fn model(&self) -> &str {
        MODEL
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Records the peak number of concurrent batch calls.
#[derive(Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    pub peak: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

#[async_trait]
impl EmbeddingProvider for ConcurrencyProbe {
    async fn embed(&self, text: &str, _input_type: InputType) -> Result<Vec<f32>> {
        Ok(bag_of_words(text, DIMS))
    }

    async fn embed_batch(&self, texts: &[&str], _input_type: InputType) -> Result<Vec<Vec<f32>>> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(texts.len());
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| bag_of_words(t, DIMS)).collect())
    }

    fn model(&self) -> &str {
        MODEL
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Completion model that echoes the number of context blocks it saw.
#[derive(Default)]
pub struct EchoModel {
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<Prompt>>,
}

#[async_trait]
impl CompletionModel for EchoModel {
    async fn complete(&self, prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.clone());
        Ok(format!("answered from {} source(s)", prompt.sources.len()))
    }

    fn model(&self) -> &str {
        "echo"
    }
}

/// Streams a fixed answer one word at a time.
pub struct WordStreamModel {
    pub answer: &'static str,
}

#[async_trait]
impl CompletionModel for WordStreamModel {
    async fn complete(&self, _prompt: &Prompt) -> Result<String> {
        Ok(self.answer.to_string())
    }

    async fn complete_stream(&self, _prompt: &Prompt) -> Result<TokenStream> {
        let words: Vec<Result<String>> =
            self.answer.split_inclusive(' ').map(|w| Ok(w.to_string())).collect();
        Ok(Box::pin(futures::stream::iter(words)))
    }

    fn model(&self) -> &str {
        "words"
    }
}

/// Embedding settings with fast retries.
pub fn fast_embedding_config() -> EmbeddingConfig {
    EmbeddingConfig {
        model: MODEL.to_string(),
        dimensions: DIMS,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        ..EmbeddingConfig::default()
    }
}

/// Pipeline configuration for small test documents.
pub fn test_config() -> RagConfig {
    RagConfig::builder()
        .embedding(fast_embedding_config())
        .chunk_size(120)
        .chunk_overlap(20)
        .min_chunk_size(10)
        .top_k(3)
        .score_threshold(0.3)
        .build()
        .unwrap()
}

pub fn pipeline_with(provider: Arc<dyn EmbeddingProvider>, config: RagConfig) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(provider)
        .vector_store(Arc::new(InMemoryVectorStore::new()))
        .build()
        .unwrap()
}
