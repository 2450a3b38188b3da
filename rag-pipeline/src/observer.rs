//! Stage observers invoked around every pipeline step.
//!
//! [`PipelineObserver`] is a plain trait with no tracing-library dependency;
//! [`TracingObserver`] is one implementation that emits `tracing` events.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{RagError, Result};

/// A pipeline step reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading a source into text.
    Load,
    /// Splitting text into chunks.
    Chunk,
    /// Embedding passages or a query.
    Embed,
    /// Writing chunks to the vector store.
    Upsert,
    /// Similarity search.
    Search,
    /// Reranking candidates.
    Rerank,
    /// Building the prompt.
    Assemble,
    /// Calling the completion model.
    Complete,
    /// Removing a document's chunks.
    Delete,
}

impl Stage {
    /// Lowercase stage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Chunk => "chunk",
            Stage::Embed => "embed",
            Stage::Upsert => "upsert",
            Stage::Search => "search",
            Stage::Rerank => "rerank",
            Stage::Assemble => "assemble",
            Stage::Complete => "complete",
            Stage::Delete => "delete",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one invocation of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContext {
    /// The stage.
    pub stage: Stage,
    /// The collection involved, if any.
    pub collection: Option<String>,
    /// The document involved, if any.
    pub document_id: Option<String>,
    /// Number of items processed (chunks, texts or results).
    pub items: usize,
}

impl StageContext {
    /// A context for `stage` with no details.
    pub fn new(stage: Stage) -> Self {
        Self { stage, collection: None, document_id: None, items: 0 }
    }

    /// Set the collection.
    pub fn collection(mut self, collection: &str) -> Self {
        self.collection = Some(collection.to_string());
        self
    }

    /// Set the document.
    pub fn document(mut self, document_id: &str) -> Self {
        self.document_id = Some(document_id.to_string());
        self
    }

    /// Set the item count.
    pub fn items(mut self, items: usize) -> Self {
        self.items = items;
        self
    }
}

/// Receives stage entry, exit and error notifications.
///
/// All methods default to no-ops. Implementations must be cheap; they run
/// inline on the pipeline's task.
pub trait PipelineObserver: Send + Sync {
    /// Called before the stage runs.
    fn on_stage_start(&self, _ctx: &StageContext) {}

    /// Called after the stage succeeded.
    fn on_stage_end(&self, _ctx: &StageContext, _elapsed: Duration) {}

    /// Called after the stage failed.
    fn on_stage_error(&self, _ctx: &StageContext, _error: &RagError) {}
}

/// An ordered list of observers.
#[derive(Clone, Default)]
pub struct Observers {
    observers: Vec<Arc<dyn PipelineObserver>>,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers").field("len", &self.observers.len()).finish()
    }
}

impl Observers {
    /// Wrap a list of observers.
    pub fn new(observers: Vec<Arc<dyn PipelineObserver>>) -> Self {
        Self { observers }
    }

    /// Append an observer.
    pub fn push(&mut self, observer: Arc<dyn PipelineObserver>) {
        self.observers.push(observer);
    }

    /// Whether no observer is registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Run `fut` as stage `ctx`, notifying every observer.
    pub async fn observe<T, F>(&self, ctx: StageContext, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.observers.is_empty() {
            return fut.await;
        }

        for observer in &self.observers {
            observer.on_stage_start(&ctx);
        }
        let started = Instant::now();
        let result = fut.await;
        match &result {
            Ok(_) => {
                let elapsed = started.elapsed();
                for observer in &self.observers {
                    observer.on_stage_end(&ctx, elapsed);
                }
            }
            Err(e) => {
                for observer in &self.observers {
                    observer.on_stage_error(&ctx, e);
                }
            }
        }
        result
    }
}

/// Logs stage activity through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_stage_start(&self, ctx: &StageContext) {
        debug!(
            stage = ctx.stage.as_str(),
            collection = ctx.collection.as_deref(),
            document.id = ctx.document_id.as_deref(),
            items = ctx.items,
            "stage started"
        );
    }

    fn on_stage_end(&self, ctx: &StageContext, elapsed: Duration) {
        debug!(
            stage = ctx.stage.as_str(),
            collection = ctx.collection.as_deref(),
            document.id = ctx.document_id.as_deref(),
            elapsed_ms = elapsed.as_millis() as u64,
            "stage finished"
        );
    }

    fn on_stage_error(&self, ctx: &StageContext, error: &RagError) {
        warn!(
            stage = ctx.stage.as_str(),
            collection = ctx.collection.as_deref(),
            document.id = ctx.document_id.as_deref(),
            error = %error,
            "stage failed"
        );
    }
}
