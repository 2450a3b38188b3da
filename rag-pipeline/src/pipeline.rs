//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] coordinates the ingest workflow (load → chunk → embed
//! → upsert, tracked in a [`DocumentRegistry`]) and the query workflow
//! (embed → search → rerank → assemble → complete).
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_pipeline::{InMemoryVectorStore, IngestRequest, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_embedder))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! pipeline.create_collection("docs").await?;
//! pipeline.ingest_document("docs", IngestRequest::text("guide.txt", text)).await?;
//! let results = pipeline.query("docs", "search query").await?;
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::chunking::Chunker;
use crate::completion::{CompletionModel, TokenStream};
use crate::config::RagConfig;
use crate::document::{
    CONTENT_HASH_KEY, Chunk, CollectionConfig, Document, EmbeddedChunk, IngestionState, Query,
    SearchResult, document_id,
};
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::loader::{DocumentLoader, LoadedDocument, MIME_TEXT};
use crate::observer::{Observers, PipelineObserver, Stage, StageContext};
use crate::prompt::{Prompt, PromptAssembler, SourceRef};
use crate::registry::{DocumentRecord, DocumentRegistry, content_hash};
use crate::reranker::Reranker;
use crate::retriever::Retriever;
use crate::vectorstore::VectorStore;

/// A document to ingest.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestRequest {
    /// File path or URL identifying the document within its collection.
    pub source: String,
    /// MIME type the text was extracted from.
    pub mime_type: String,
    /// The document text.
    pub text: String,
    /// Metadata copied onto every chunk.
    pub metadata: HashMap<String, String>,
}

impl IngestRequest {
    /// A plain-text document.
    pub fn text(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            mime_type: MIME_TEXT.to_string(),
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }
}

impl From<LoadedDocument> for IngestRequest {
    fn from(doc: LoadedDocument) -> Self {
        Self {
            source: doc.source,
            mime_type: doc.mime_type,
            text: doc.text,
            metadata: HashMap::new(),
        }
    }
}

/// Result of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    /// The document's identifier.
    pub document_id: String,
    /// The document's source.
    pub source: String,
    /// Total number of chunks of the document.
    pub chunk_count: usize,
    /// Chunks embedded and stored by this call.
    pub upserted: usize,
    /// Chunk index this call resumed from, if it continued an earlier run.
    pub resumed_from: Option<usize>,
    /// Whether the document was already ingested with identical content.
    pub skipped: bool,
}

/// Outcome of one document in a bulk ingestion.
#[derive(Debug)]
pub struct DocumentOutcome {
    /// The document's source.
    pub source: String,
    /// The document's identifier.
    pub document_id: String,
    /// What happened.
    pub result: Result<IngestSummary>,
}

impl DocumentOutcome {
    fn new(collection: &str, source: String, result: Result<IngestSummary>) -> Self {
        Self { document_id: document_id(collection, &source), source, result }
    }
}

/// Per-document outcomes of a bulk ingestion, in request order.
#[derive(Debug, Default)]
pub struct IngestionReport {
    /// One outcome per requested document.
    pub outcomes: Vec<DocumentOutcome>,
}

impl IngestionReport {
    /// Number of documents ingested successfully.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &DocumentOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// Whether every document succeeded.
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }

    /// The summaries, or [`RagError::IngestionPartialFailure`] listing every
    /// failed document.
    pub fn into_result(self) -> Result<Vec<IngestSummary>> {
        let succeeded = self.succeeded();
        let mut summaries = Vec::with_capacity(succeeded);
        let mut failures = Vec::new();
        for outcome in self.outcomes {
            match outcome.result {
                Ok(summary) => summaries.push(summary),
                Err(e) => failures.push((outcome.source, e.to_string())),
            }
        }
        if failures.is_empty() {
            Ok(summaries)
        } else {
            Err(RagError::IngestionPartialFailure { failures, succeeded })
        }
    }
}

/// A generated answer with the context it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// The answer text.
    pub text: String,
    /// Chunks included in the prompt.
    pub sources: Vec<SourceRef>,
    /// Whether retrieved context was used. `false` for chat answers and
    /// for the fixed no-context answer, which skips the model.
    pub used_context: bool,
}

/// A streamed answer: the prompt's sources up front, the text as it arrives.
pub struct AnswerStream {
    /// Chunks included in the prompt.
    pub sources: Vec<SourceRef>,
    /// Whether retrieved context was used, as in [`Answer::used_context`].
    pub used_context: bool,
    /// Pieces of the answer text.
    pub tokens: TokenStream,
}

impl AnswerStream {
    /// Wait for the whole stream and join it into an [`Answer`].
    pub async fn collect(self) -> Result<Answer> {
        let pieces: Vec<String> = self.tokens.try_collect().await?;
        Ok(Answer { text: pieces.concat(), sources: self.sources, used_context: self.used_context })
    }
}

impl std::fmt::Debug for AnswerStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerStream")
            .field("sources", &self.sources)
            .field("used_context", &self.used_context)
            .finish_non_exhaustive()
    }
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    chunker: Chunker,
    embedder: Embedder,
    vector_store: Arc<dyn VectorStore>,
    retriever: Retriever,
    assembler: PromptAssembler,
    completion_model: Option<Arc<dyn CompletionModel>>,
    loader: DocumentLoader,
    registry: DocumentRegistry,
    observers: Observers,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedder.
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Return a reference to the retriever.
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Return a reference to the document registry.
    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// Create a named collection for the configured embedding model.
    ///
    /// Creating a collection that already exists with the same model is a
    /// no-op.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        let config = CollectionConfig::new(name, self.embedder.model(), self.embedder.dimensions())
            .with_metric(self.config.embedding.metric);
        self.vector_store.create_collection(config).await.inspect_err(|e| {
            error!(collection = name, error = %e, "failed to create collection");
        })
    }

    /// Delete a collection and forget its documents.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.vector_store.delete_collection(name).await?;
        let removed = self.registry.remove_collection(name).await;
        info!(collection = name, documents = removed, "deleted collection");
        Ok(())
    }

    /// Ingest one document: chunk → embed → upsert.
    ///
    /// Re-ingesting identical content that is already embedded is a no-op.
    /// If an earlier run with identical content was interrupted, ingestion
    /// resumes after the last stored chunk. Changed content replaces all
    /// previous chunks of the document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::CollectionNotFound`] or [`RagError::ModelMismatch`]
    /// before anything is written; embedding or storage failures mark the
    /// document [`IngestionState::Failed`] and are returned.
    pub async fn ingest_document(
        &self,
        collection: &str,
        request: IngestRequest,
    ) -> Result<IngestSummary> {
        let info = self.vector_store.collection(collection).await?;
        if info.embedding_model != self.embedder.model() {
            return Err(RagError::ModelMismatch {
                collection: collection.to_string(),
                expected: info.embedding_model,
                actual: self.embedder.model().to_string(),
            });
        }

        let hash = content_hash(&request.text);
        let mut document =
            Document::new(collection, request.source, request.mime_type, request.text)
                .with_metadata(request.metadata);
        document.metadata.insert(CONTENT_HASH_KEY.to_string(), hash.clone());

        let mut resume_from = 0;
        let mut recovered = Vec::new();
        match self.registry.get(&document.id).await {
            Some(record)
                if record.content_hash == hash && record.state == IngestionState::Embedded =>
            {
                info!(
                    document.id = %document.id,
                    source = %document.source,
                    "document unchanged, skipping"
                );
                return Ok(IngestSummary {
                    document_id: document.id,
                    source: document.source,
                    chunk_count: record.chunk_count,
                    upserted: 0,
                    resumed_from: None,
                    skipped: true,
                });
            }
            Some(record) if record.content_hash == hash => {
                resume_from = record.resume_index();
            }
            Some(_) => {
                let removed = self.delete_chunks(collection, &document.id).await?;
                info!(
                    document.id = %document.id,
                    removed,
                    "document content changed, replacing chunks"
                );
            }
            None => {
                recovered = self.stored_chunks(collection, &document.id, &hash).await?;
            }
        }

        self.registry
            .put(DocumentRecord {
                document_id: document.id.clone(),
                collection: collection.to_string(),
                source: document.source.clone(),
                mime_type: document.mime_type.clone(),
                state: IngestionState::Pending,
                content_hash: hash,
                chunk_count: 0,
                last_upserted: resume_from.checked_sub(1),
                error: None,
                updated_at: Utc::now(),
            })
            .await;

        match self.run_ingestion(collection, &document, resume_from, recovered).await {
            Ok(summary) => {
                self.registry.update(&document.id, |r| r.state = IngestionState::Embedded).await;
                info!(
                    document.id = %document.id,
                    source = %document.source,
                    chunk_count = summary.chunk_count,
                    upserted = summary.upserted,
                    "ingested document"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(
                    document.id = %document.id,
                    source = %document.source,
                    error = %e,
                    "ingestion failed"
                );
                let message = e.to_string();
                self.registry
                    .update(&document.id, |r| {
                        r.state = IngestionState::Failed;
                        r.error = Some(message);
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// Chunks already stored for a document the registry does not know,
    /// such as after loading a store snapshot into a fresh pipeline.
    ///
    /// Chunks cut from other content are deleted and nothing is returned.
    async fn stored_chunks(
        &self,
        collection: &str,
        document_id: &str,
        hash: &str,
    ) -> Result<Vec<Chunk>> {
        let stored = self.vector_store.document_chunks(collection, document_id).await?;
        if stored.iter().all(|c| c.content_hash() == Some(hash)) {
            return Ok(stored);
        }
        let removed = self.delete_chunks(collection, document_id).await?;
        info!(document.id = document_id, removed, "stored chunks are stale, replacing");
        Ok(Vec::new())
    }

    async fn run_ingestion(
        &self,
        collection: &str,
        document: &Document,
        resume_from: usize,
        recovered: Vec<Chunk>,
    ) -> Result<IngestSummary> {
        let chunks: Vec<Chunk> = self
            .observers
            .observe(
                StageContext::new(Stage::Chunk).collection(collection).document(&document.id),
                async { Ok(self.chunker.chunk_document(document).collect()) },
            )
            .await?;

        let resume_from = if recovered.is_empty() {
            resume_from
        } else if let Some(stored) = stored_prefix(&recovered, &chunks) {
            stored
        } else {
            let removed = self.delete_chunks(collection, &document.id).await?;
            info!(document.id = %document.id, removed, "stored chunks do not match, replacing");
            0
        };

        let chunk_count = chunks.len();
        self.registry
            .update(&document.id, |r| {
                r.state = IngestionState::Chunked;
                r.chunk_count = chunk_count;
                r.last_upserted = resume_from.checked_sub(1);
            })
            .await;

        let pending = chunks.get(resume_from..).unwrap_or_default();
        if resume_from > 0 {
            info!(
                document.id = %document.id,
                resume_from,
                chunk_count,
                "resuming interrupted ingestion"
            );
        }

        for window in pending.chunks(self.config.ingestion.upsert_window.max(1)) {
            let texts: Vec<&str> = window.iter().map(|c| c.text.as_str()).collect();
            let embeddings = self
                .observers
                .observe(
                    StageContext::new(Stage::Embed)
                        .collection(collection)
                        .document(&document.id)
                        .items(texts.len()),
                    self.embedder.embed_passages(&texts),
                )
                .await?;

            let items: Vec<EmbeddedChunk> = window
                .iter()
                .cloned()
                .zip(embeddings)
                .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
                .collect();
            self.observers
                .observe(
                    StageContext::new(Stage::Upsert)
                        .collection(collection)
                        .document(&document.id)
                        .items(items.len()),
                    self.vector_store.upsert(collection, &items),
                )
                .await?;

            let last = window.last().map(|c| c.index);
            self.registry.update(&document.id, |r| r.last_upserted = last).await;
        }

        Ok(IngestSummary {
            document_id: document.id.clone(),
            source: document.source.clone(),
            chunk_count,
            upserted: pending.len(),
            resumed_from: (resume_from > 0).then_some(resume_from),
            skipped: false,
        })
    }

    /// Ingest several documents concurrently.
    ///
    /// A failed document never aborts the others; see
    /// [`IngestionReport::into_result`].
    pub async fn ingest_batch(
        &self,
        collection: &str,
        requests: Vec<IngestRequest>,
    ) -> IngestionReport {
        let limit = self.config.ingestion.max_concurrent_documents.max(1);
        let mut outcomes: Vec<(usize, DocumentOutcome)> =
            stream::iter(requests.into_iter().enumerate())
                .map(|(i, request)| async move {
                    let source = request.source.clone();
                    let result = self.ingest_document(collection, request).await;
                    (i, DocumentOutcome::new(collection, source, result))
                })
                .buffer_unordered(limit)
                .collect()
                .await;
        outcomes.sort_by_key(|(i, _)| *i);
        self.finish_report(collection, outcomes)
    }

    /// Load and ingest files concurrently. Each file's MIME type is guessed
    /// from its extension.
    pub async fn ingest_paths(&self, collection: &str, paths: &[PathBuf]) -> IngestionReport {
        let limit = self.config.ingestion.max_concurrent_documents.max(1);
        let mut outcomes: Vec<(usize, DocumentOutcome)> = stream::iter(paths.iter().enumerate())
            .map(|(i, path)| async move {
                let source = path.display().to_string();
                let result = match self.load_path(collection, path).await {
                    Ok(loaded) => self.ingest_document(collection, loaded.into()).await,
                    Err(e) => Err(e),
                };
                (i, DocumentOutcome::new(collection, source, result))
            })
            .buffer_unordered(limit)
            .collect()
            .await;
        outcomes.sort_by_key(|(i, _)| *i);
        self.finish_report(collection, outcomes)
    }

    async fn load_path(&self, collection: &str, path: &std::path::Path) -> Result<LoadedDocument> {
        self.observers
            .observe(
                StageContext::new(Stage::Load).collection(collection),
                self.loader.load_path(path, None),
            )
            .await
    }

    fn finish_report(
        &self,
        collection: &str,
        outcomes: Vec<(usize, DocumentOutcome)>,
    ) -> IngestionReport {
        let report = IngestionReport { outcomes: outcomes.into_iter().map(|(_, o)| o).collect() };
        let failed = report.outcomes.len() - report.succeeded();
        if failed > 0 {
            warn!(
                collection,
                succeeded = report.succeeded(),
                failed,
                "bulk ingestion finished with failures"
            );
        } else {
            info!(collection, succeeded = report.succeeded(), "bulk ingestion finished");
        }
        report
    }

    /// Lifecycle state of a document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentNotFound`] if the document is unknown.
    pub async fn status(&self, document_id: &str) -> Result<IngestionState> {
        self.document(document_id).await.map(|r| r.state)
    }

    /// Registry record of a document.
    pub async fn document(&self, document_id: &str) -> Result<DocumentRecord> {
        self.registry
            .get(document_id)
            .await
            .ok_or_else(|| RagError::DocumentNotFound(document_id.to_string()))
    }

    /// Records of every document ingested into `collection`, sorted by source.
    pub async fn documents(&self, collection: &str) -> Result<Vec<DocumentRecord>> {
        self.vector_store.collection(collection).await?;
        Ok(self.registry.list(collection).await)
    }

    /// Remove a document's chunks and its registry record. Returns the
    /// number of chunks removed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::DocumentNotFound`] if the collection holds neither
    /// chunks nor a record for the document.
    pub async fn delete_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let removed = self.delete_chunks(collection, document_id).await?;
        let record = self.registry.remove(document_id).await;
        if removed == 0 && record.is_none() {
            return Err(RagError::DocumentNotFound(document_id.to_string()));
        }
        info!(collection, document.id = document_id, removed, "deleted document");
        Ok(removed)
    }

    /// Remove the document ingested from `source`.
    pub async fn delete_source(&self, collection: &str, source: &str) -> Result<usize> {
        self.delete_document(collection, &document_id(collection, source)).await
    }

    async fn delete_chunks(&self, collection: &str, document_id: &str) -> Result<usize> {
        self.observers
            .observe(
                StageContext::new(Stage::Delete).collection(collection).document(document_id),
                self.vector_store.delete_document(collection, document_id),
            )
            .await
    }

    /// Retrieve the most relevant chunks for a query.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Timeout`] if `retrieval.timeout_ms` is set and
    /// exceeded.
    pub async fn query(
        &self,
        collection: &str,
        query: impl Into<Query>,
    ) -> Result<Vec<SearchResult>> {
        let query = query.into();
        self.with_timeout(self.retriever.retrieve(collection, &query)).await
    }

    /// Build the prompt that [`answer`](Self::answer) would send.
    pub async fn prompt(&self, collection: &str, query: impl Into<Query>) -> Result<Prompt> {
        let query = query.into();
        let results = self.query(collection, query.clone()).await?;
        self.assemble(collection, &query, &results).await
    }

    /// Retrieve context and generate an answer.
    ///
    /// When nothing relevant is retrieved the completion model is not called
    /// and the configured no-context answer is returned.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if no completion model is
    /// configured.
    pub async fn answer(&self, collection: &str, query: impl Into<Query>) -> Result<Answer> {
        let model = self.require_completion_model()?;
        let Some(prompt) = self.grounded_prompt(collection, &query.into()).await? else {
            return Ok(self.no_context_answer());
        };
        let text = self
            .observers
            .observe(complete_context(collection, &prompt), model.complete(&prompt))
            .await?;
        Ok(Answer { text, sources: prompt.sources, used_context: true })
    }

    /// Like [`answer`](Self::answer), but the answer text is streamed as the
    /// model generates it.
    ///
    /// When nothing relevant is retrieved the stream yields the configured
    /// no-context answer as its only item.
    pub async fn answer_stream(
        &self,
        collection: &str,
        query: impl Into<Query>,
    ) -> Result<AnswerStream> {
        let model = self.require_completion_model()?;
        let Some(prompt) = self.grounded_prompt(collection, &query.into()).await? else {
            let text = self.config.prompt.no_context_answer.clone();
            return Ok(AnswerStream {
                sources: Vec::new(),
                used_context: false,
                tokens: Box::pin(stream::once(async move { Ok(text) })),
            });
        };
        let tokens = self
            .observers
            .observe(complete_context(collection, &prompt), model.complete_stream(&prompt))
            .await?;
        Ok(AnswerStream { sources: prompt.sources, used_context: true, tokens })
    }

    /// Answer without retrieval, using the chat instruction and the query's
    /// conversation summary only.
    pub async fn chat(&self, query: impl Into<Query>) -> Result<Answer> {
        let model = self.require_completion_model()?;
        let prompt = self.chat_prompt(&query.into()).await?;
        let text = self
            .observers
            .observe(StageContext::new(Stage::Complete), model.complete(&prompt))
            .await?;
        Ok(Answer { text, sources: Vec::new(), used_context: false })
    }

    /// Like [`chat`](Self::chat), but the answer text is streamed.
    pub async fn chat_stream(&self, query: impl Into<Query>) -> Result<AnswerStream> {
        let model = self.require_completion_model()?;
        let prompt = self.chat_prompt(&query.into()).await?;
        let tokens = self
            .observers
            .observe(StageContext::new(Stage::Complete), model.complete_stream(&prompt))
            .await?;
        Ok(AnswerStream { sources: Vec::new(), used_context: false, tokens })
    }

    fn require_completion_model(&self) -> Result<Arc<dyn CompletionModel>> {
        self.completion_model.clone().ok_or_else(|| {
            RagError::InvalidConfiguration("no completion model configured".to_string())
        })
    }

    fn no_context_answer(&self) -> Answer {
        Answer {
            text: self.config.prompt.no_context_answer.clone(),
            sources: Vec::new(),
            used_context: false,
        }
    }

    /// Retrieve and assemble; `None` when nothing relevant was retrieved.
    async fn grounded_prompt(&self, collection: &str, query: &Query) -> Result<Option<Prompt>> {
        let results = self.query(collection, query.clone()).await?;
        if results.is_empty() {
            info!(collection, "no relevant context retrieved");
            return Ok(None);
        }
        self.assemble(collection, query, &results).await.map(Some)
    }

    async fn assemble(
        &self,
        collection: &str,
        query: &Query,
        results: &[SearchResult],
    ) -> Result<Prompt> {
        let summary = query.history_summary.as_deref();
        self.observers
            .observe(
                StageContext::new(Stage::Assemble).collection(collection).items(results.len()),
                async { self.assembler.assemble(&query.text, results, summary) },
            )
            .await
    }

    async fn chat_prompt(&self, query: &Query) -> Result<Prompt> {
        let summary = query.history_summary.as_deref();
        self.observers
            .observe(StageContext::new(Stage::Assemble), async {
                self.assembler.assemble_chat(&query.text, summary)
            })
            .await
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.config.retrieval.timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), fut)
                .await
                .map_err(|_| RagError::Timeout(ms))?,
            None => fut.await,
        }
    }
}

fn complete_context(collection: &str, prompt: &Prompt) -> StageContext {
    StageContext::new(Stage::Complete).collection(collection).items(prompt.sources.len())
}

/// Builder for constructing a [`RagPipeline`].
///
/// `config`, `embedding_provider` and `vector_store` are required. Call
/// [`build()`](RagPipelineBuilder::build) to validate and produce the
/// pipeline.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(RagConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .reranker(Arc::new(reranker))  // optional
///     .completion_model(Arc::new(llm))  // optional, needed for answer()
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    reranker: Option<Arc<dyn Reranker>>,
    completion_model: Option<Arc<dyn CompletionModel>>,
    observers: Observers,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set an optional reranker for post-search result reordering.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the completion model used by [`RagPipeline::answer`].
    pub fn completion_model(mut self, model: Arc<dyn CompletionModel>) -> Self {
        self.completion_model = Some(model);
        self
    }

    /// Register a stage observer.
    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Build the [`RagPipeline`], validating the configuration and that all
    /// required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if any required field is
    /// missing, the configuration is invalid, or the provider's
    /// dimensionality differs from `embedding.dimensions`.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.ok_or_else(|| missing("config"))?;
        config.validate()?;
        let provider = self.embedding_provider.ok_or_else(|| missing("embedding_provider"))?;
        let vector_store = self.vector_store.ok_or_else(|| missing("vector_store"))?;

        if provider.dimensions() != config.embedding.dimensions {
            return Err(RagError::InvalidConfiguration(format!(
                "provider produces {} dimensions but embedding.dimensions is {}",
                provider.dimensions(),
                config.embedding.dimensions
            )));
        }

        let chunker = Chunker::new(config.chunking.clone())?;
        let embedder = Embedder::new(provider, &config.embedding);
        let mut retriever =
            Retriever::new(embedder.clone(), vector_store.clone(), config.retrieval.clone())
                .with_observers(self.observers.clone());
        if let Some(reranker) = self.reranker {
            retriever = retriever.with_reranker(reranker);
        }

        Ok(RagPipeline {
            assembler: PromptAssembler::new(config.prompt.clone()),
            config,
            chunker,
            embedder,
            vector_store,
            retriever,
            completion_model: self.completion_model,
            loader: DocumentLoader::new(),
            registry: DocumentRegistry::new(),
            observers: self.observers,
        })
    }
}

/// Number of leading chunks already stored exactly as `chunks` cuts them,
/// or `None` if the stored chunks are not such a prefix.
fn stored_prefix(stored: &[Chunk], chunks: &[Chunk]) -> Option<usize> {
    if stored.len() > chunks.len() {
        return None;
    }
    stored
        .iter()
        .zip(chunks)
        .all(|(s, c)| s.id == c.id && s.start == c.start && s.end == c.end)
        .then_some(stored.len())
}

fn missing(field: &str) -> RagError {
    RagError::InvalidConfiguration(format!("{field} is required"))
}
