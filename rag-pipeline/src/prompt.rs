//! Prompt assembly within a character budget.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::PromptConfig;
use crate::document::SearchResult;
use crate::error::{RagError, Result};

/// Attribution for one context block included in a prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// The chunk's identifier.
    pub chunk_id: String,
    /// The chunk's document.
    pub document_id: String,
    /// The document's source, when recorded in the chunk metadata.
    pub source: Option<String>,
    /// Retrieval score of the chunk.
    pub score: f32,
}

/// An assembled prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// System instruction.
    pub system: String,
    /// User message: summary, numbered context blocks and the query.
    pub user: String,
    /// Context blocks that were included, in prompt order.
    pub sources: Vec<SourceRef>,
    /// Number of retrieved chunks left out to fit the budget.
    pub dropped: usize,
    /// Whether the conversation summary was kept.
    pub summary_included: bool,
}

impl Prompt {
    /// The full prompt as one string.
    pub fn text(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }

    /// Length of [`text`](Self::text) in characters.
    pub fn char_len(&self) -> usize {
        self.system.chars().count() + 2 + self.user.chars().count()
    }
}

/// Renders retrieved chunks and a query into a [`Prompt`].
///
/// Chunks are numbered in the order they were retrieved, so a reranker's
/// order carries into the prompt. When the rendered prompt exceeds
/// `max_prompt_chars`, whole chunks are dropped starting from the lowest
/// score, then the conversation summary. The query is never altered.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    config: PromptConfig,
}

impl PromptAssembler {
    /// Create an assembler.
    pub fn new(config: PromptConfig) -> Self {
        Self { config }
    }

    /// The assembler's configuration.
    pub fn config(&self) -> &PromptConfig {
        &self.config
    }

    /// Assemble a prompt for `query` from `results`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::PromptTooLarge`] if the instruction and query
    /// alone exceed the budget.
    pub fn assemble(
        &self,
        query: &str,
        results: &[SearchResult],
        history_summary: Option<&str>,
    ) -> Result<Prompt> {
        self.fit(&self.config.system_instruction, query, results, history_summary)
    }

    /// Assemble a prompt that answers `query` without retrieved context,
    /// using the chat instruction.
    pub fn assemble_chat(&self, query: &str, history_summary: Option<&str>) -> Result<Prompt> {
        self.fit(&self.config.chat_instruction, query, &[], history_summary)
    }

    fn fit(
        &self,
        instruction: &str,
        query: &str,
        results: &[SearchResult],
        history_summary: Option<&str>,
    ) -> Result<Prompt> {
        // Lowest score first; among equal scores the later block goes first.
        let mut drop_order: Vec<usize> = (0..results.len()).collect();
        drop_order.sort_by(|&a, &b| results[a].score.total_cmp(&results[b].score).then(b.cmp(&a)));

        let budget = self.config.max_prompt_chars;
        let instruction_len = instruction.chars().count() + 2;
        let mut summary = history_summary.filter(|s| !s.trim().is_empty());
        let mut keep = vec![true; results.len()];
        let mut dropped = 0;

        loop {
            let included: Vec<&SearchResult> =
                results.iter().zip(&keep).filter(|(_, k)| **k).map(|(r, _)| r).collect();
            let user = render_user(query, &included, summary);
            let len = instruction_len + user.chars().count();
            if len <= budget {
                if dropped > 0 {
                    debug!(dropped, budget, "dropped context chunks to fit prompt budget");
                }
                return Ok(Prompt {
                    system: instruction.to_string(),
                    user,
                    sources: included.iter().map(|r| source_ref(r)).collect(),
                    dropped,
                    summary_included: summary.is_some(),
                });
            }

            if let Some(&next) = drop_order.get(dropped) {
                keep[next] = false;
                dropped += 1;
            } else if summary.is_some() {
                summary = None;
            } else {
                return Err(RagError::PromptTooLarge { required: len, budget });
            }
        }
    }
}

fn source_ref(result: &SearchResult) -> SourceRef {
    SourceRef {
        chunk_id: result.chunk.id.clone(),
        document_id: result.chunk.document_id.clone(),
        source: result.chunk.source().map(str::to_string),
        score: result.score,
    }
}

fn render_user(query: &str, results: &[&SearchResult], summary: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(summary) = summary {
        out.push_str("Conversation so far:\n");
        out.push_str(summary);
        out.push_str("\n\n");
    }
    if !results.is_empty() {
        out.push_str("Context:\n");
        for (i, result) in results.iter().enumerate() {
            let source = result.chunk.source().unwrap_or(result.chunk.document_id.as_str());
            out.push_str(&format!("[{}] (source: {})\n{}\n\n", i + 1, source, result.chunk.text));
        }
    }
    out.push_str("Question: ");
    out.push_str(query);
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::document::Chunk;

    fn result(id: &str, text: &str, score: f32) -> SearchResult {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), format!("{id}.txt"));
        SearchResult {
            chunk: Chunk {
                id: format!("{id}_0"),
                document_id: id.to_string(),
                index: 0,
                text: text.to_string(),
                start: 0,
                end: text.chars().count(),
                label: None,
                metadata,
            },
            score,
        }
    }

    fn assembler(max_prompt_chars: usize) -> PromptAssembler {
        PromptAssembler::new(PromptConfig {
            max_prompt_chars,
            system_instruction: "Answer from context.".to_string(),
            ..PromptConfig::default()
        })
    }

    #[test]
    fn numbers_blocks_in_retrieval_order() {
        let results = vec![result("high", "alpha", 0.9), result("low", "beta", 0.4)];
        let prompt = assembler(10_000)
            .assemble("What is alpha?", &results, Some("User asked about greek letters."))
            .unwrap();

        assert!(prompt.user.starts_with("Conversation so far:\nUser asked about greek letters."));
        let first = prompt.user.find("[1] (source: high.txt)\nalpha").unwrap();
        let second = prompt.user.find("[2] (source: low.txt)\nbeta").unwrap();
        assert!(first < second);
        assert!(prompt.user.ends_with("Question: What is alpha?"));
        assert_eq!(prompt.sources[0].chunk_id, "high_0");
        assert_eq!(prompt.dropped, 0);
        assert_eq!(prompt.char_len(), prompt.text().chars().count());
    }

    #[test]
    fn drops_lowest_score_chunks_first() {
        let results = vec![
            result("a", &"a".repeat(100), 0.9),
            result("b", &"b".repeat(100), 0.5),
            result("c", &"c".repeat(100), 0.7),
        ];
        let full = assembler(10_000).assemble("q?", &results, None).unwrap();
        let budget = full.char_len() - 50;

        let prompt = assembler(budget).assemble("q?", &results, None).unwrap();
        assert_eq!(prompt.dropped, 1);
        let kept: Vec<&str> = prompt.sources.iter().map(|s| s.document_id.as_str()).collect();
        assert_eq!(kept, vec!["a", "c"]);
        assert!(prompt.char_len() <= budget);
        assert!(prompt.user.ends_with("Question: q?"));
    }

    #[test]
    fn reordered_results_keep_their_order_but_lose_lowest_score() {
        // A reranker put the weaker-scored chunk first without rescoring.
        let results = vec![
            result("promoted", &"p".repeat(100), 0.2),
            result("strong", &"s".repeat(100), 0.9),
            result("middle", &"m".repeat(100), 0.6),
        ];
        let full = assembler(10_000).assemble("q?", &results, None).unwrap();
        let order: Vec<&str> = full.sources.iter().map(|s| s.document_id.as_str()).collect();
        assert_eq!(order, vec!["promoted", "strong", "middle"]);

        let prompt = assembler(full.char_len() - 50).assemble("q?", &results, None).unwrap();
        let kept: Vec<&str> = prompt.sources.iter().map(|s| s.document_id.as_str()).collect();
        assert_eq!(kept, vec!["strong", "middle"]);
        assert!(prompt.user.starts_with("Context:\n[1] (source: strong.txt)"));
    }

    #[test]
    fn chat_prompt_has_no_context() {
        let prompt = assembler(10_000).assemble_chat("hello?", Some("Earlier greeting.")).unwrap();
        assert_eq!(prompt.system, PromptConfig::default().chat_instruction);
        assert_eq!(prompt.user, "Conversation so far:\nEarlier greeting.\n\nQuestion: hello?");
        assert!(prompt.sources.is_empty());
    }

    #[test]
    fn summary_goes_after_all_chunks() {
        let results = vec![result("a", "short", 0.9)];
        let bare = assembler(10_000).assemble("q?", &[], None).unwrap();
        let prompt =
            assembler(bare.char_len()).assemble("q?", &results, Some("a long summary")).unwrap();
        assert_eq!(prompt.dropped, 1);
        assert!(!prompt.summary_included);
        assert_eq!(prompt.user, "Question: q?");
    }

    #[test]
    fn query_alone_over_budget_fails() {
        let err = assembler(10).assemble("a very long question indeed", &[], None).unwrap_err();
        assert!(matches!(err, RagError::PromptTooLarge { budget: 10, .. }));
    }
}
