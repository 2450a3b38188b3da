//! Retrieval-augmented generation pipeline.
//!
//! This crate provides:
//! - Document loading for text, markdown, HTML and PDF sources
//! - Overlapping fixed-size chunking with exact source offsets
//! - Batched, rate-limited embedding with retries
//! - A vector store trait and an in-memory implementation
//! - Retrieval with score thresholds, deduplication and optional reranking
//! - Prompt assembly within a character budget and answer generation,
//!   whole or streamed
//! - Per-document ingestion tracking with resumable, idempotent re-ingest
//!
//! # Features
//!
//! - `http` (default): HTTP clients for hosted embedding, ranking and
//!   completion endpoints
//! - `pdf` (default): PDF text extraction

pub mod chunking;
pub mod completion;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod inmemory;
pub mod loader;
pub mod observer;
pub mod pipeline;
pub mod prompt;
pub mod registry;
pub mod reranker;
pub mod retriever;
mod retry;
pub mod vectorstore;

#[cfg(feature = "http")]
pub mod http;

pub use chunking::{Chunker, TextSpan, label_for, reconstruct};
pub use completion::{CompletionModel, TokenStream};
pub use config::{
    ChunkUnit, ChunkingConfig, EmbeddingConfig, IngestionConfig, LlmConfig, PromptConfig,
    RagConfig, RagConfigBuilder, RankingConfig, RetrievalConfig, RetryConfig,
};
pub use document::{
    CONTENT_HASH_KEY, Chunk, ChunkLabel, CollectionConfig, Document, EmbeddedChunk, Embedding,
    IngestionState, Query, SearchResult, SimilarityMetric, document_id,
};
pub use embedding::{Embedder, EmbeddingProvider, InputType};
pub use error::{RagError, Result};
pub use inmemory::InMemoryVectorStore;
pub use loader::{DocumentLoader, LoadedDocument};
pub use observer::{Observers, PipelineObserver, Stage, StageContext, TracingObserver};
pub use pipeline::{
    Answer, AnswerStream, DocumentOutcome, IngestRequest, IngestSummary, IngestionReport,
    RagPipeline, RagPipelineBuilder,
};
pub use prompt::{Prompt, PromptAssembler, SourceRef};
pub use registry::{DocumentRecord, DocumentRegistry, content_hash};
pub use reranker::{NoOpReranker, Reranker, TermOverlapReranker};
pub use retriever::Retriever;
pub use vectorstore::{SearchParams, VectorStore};

#[cfg(feature = "http")]
pub use http::{HttpCompletionModel, HttpEmbeddingProvider, HttpReranker};
