//! Splitting text into bounded, overlapping chunks.
//!
//! A [`Chunker`] is built from a validated [`ChunkingConfig`]. Calling
//! [`Chunker::chunks`] returns a lazy [`Spans`] iterator; cloning the iterator
//! (or calling `chunks` again) restarts the sequence from the beginning.
//!
//! Consecutive spans start `max_size - overlap` units apart. When the text
//! left after a span would contribute fewer than `min_chunk_size` new units,
//! that remainder is merged into the span instead of producing a tiny
//! trailing chunk.

use crate::config::{ChunkUnit, ChunkingConfig};
use crate::document::{Chunk, ChunkLabel, Document};
use crate::error::Result;

/// Splits text into overlapping spans according to a [`ChunkingConfig`].
///
/// # Example
///
/// ```rust,ignore
/// use rag_pipeline::{Chunker, ChunkingConfig};
///
/// let config = ChunkingConfig { max_size: 300, overlap: 50, ..Default::default() };
/// let chunker = Chunker::new(config)?;
/// let starts: Vec<usize> = chunker.chunks(&text).map(|s| s.start).collect();
/// ```
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    /// Create a chunker, validating the configuration first.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`](crate::RagError::InvalidConfiguration)
    /// if `overlap >= max_size` or the sizes are otherwise unusable.
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Return the chunking parameters.
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Lazily split `text` into spans covering it in order.
    pub fn chunks<'a>(&self, text: &'a str) -> Spans<'a> {
        let boundaries = unit_boundaries(text, self.config.unit);
        let next_start = if boundaries.len() > 1 { Some(0) } else { None };
        Spans {
            text,
            boundaries,
            max_size: self.config.max_size,
            step: self.config.max_size - self.config.overlap,
            min_chunk_size: self.config.min_chunk_size,
            next_start,
            index: 0,
        }
    }

    /// Lazily split a document into [`Chunk`]s.
    ///
    /// Each chunk inherits the document metadata plus `chunk_index`, and is
    /// labelled when its text looks like a heading, table or caption.
    pub fn chunk_document<'a>(&self, document: &'a Document) -> DocumentChunks<'a> {
        DocumentChunks { document, spans: self.chunks(&document.text) }
    }
}

/// Position of a unit boundary, both as a byte offset and a character offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Boundary {
    byte: usize,
    char: usize,
}

/// Start positions of every unit plus the end of the text.
fn unit_boundaries(text: &str, unit: ChunkUnit) -> Vec<Boundary> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut boundaries = Vec::new();
    let mut char_count = 0;
    match unit {
        ChunkUnit::Characters => {
            for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
                boundaries.push(Boundary { byte: byte_idx, char: char_idx });
                char_count = char_idx + 1;
            }
        }
        ChunkUnit::Words => {
            // The first unit also owns any leading whitespace.
            boundaries.push(Boundary { byte: 0, char: 0 });
            let mut seen_word = false;
            let mut prev_whitespace = true;
            for (char_idx, (byte_idx, c)) in text.char_indices().enumerate() {
                let whitespace = c.is_whitespace();
                if !whitespace && prev_whitespace {
                    if seen_word {
                        boundaries.push(Boundary { byte: byte_idx, char: char_idx });
                    }
                    seen_word = true;
                }
                prev_whitespace = whitespace;
                char_count = char_idx + 1;
            }
        }
    }
    boundaries.push(Boundary { byte: text.len(), char: char_count });
    boundaries
}

/// One span of the input text produced by [`Chunker::chunks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextSpan<'a> {
    /// Sequence number of the span.
    pub index: usize,
    /// The span's text.
    pub text: &'a str,
    /// Character offset of the first character.
    pub start: usize,
    /// Character offset one past the last character.
    pub end: usize,
}

/// Lazy iterator over the spans of a text. Clone it to restart.
#[derive(Debug, Clone)]
pub struct Spans<'a> {
    text: &'a str,
    boundaries: Vec<Boundary>,
    max_size: usize,
    step: usize,
    min_chunk_size: usize,
    next_start: Option<usize>,
    index: usize,
}

impl<'a> Spans<'a> {
    fn unit_count(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }
}

impl<'a> Iterator for Spans<'a> {
    type Item = TextSpan<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        let units = self.unit_count();

        let mut end = (start + self.max_size).min(units);
        if end < units && units - end < self.min_chunk_size {
            end = units;
        }
        self.next_start = if end >= units { None } else { Some(start + self.step) };

        let from = self.boundaries[start];
        let to = self.boundaries[end];
        let span = TextSpan {
            index: self.index,
            text: &self.text[from.byte..to.byte],
            start: from.char,
            end: to.char,
        };
        self.index += 1;
        Some(span)
    }
}

/// Lazy iterator over the [`Chunk`]s of a document. Clone it to restart.
#[derive(Debug, Clone)]
pub struct DocumentChunks<'a> {
    document: &'a Document,
    spans: Spans<'a>,
}

impl Iterator for DocumentChunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Self::Item> {
        let span = self.spans.next()?;
        let document = self.document;

        let mut metadata = document.metadata.clone();
        metadata.insert("chunk_index".to_string(), span.index.to_string());
        metadata.entry("source".to_string()).or_insert_with(|| document.source.clone());

        Some(Chunk {
            id: Chunk::make_id(&document.id, span.index),
            document_id: document.id.clone(),
            index: span.index,
            text: span.text.to_string(),
            start: span.start,
            end: span.end,
            label: label_for(span.text),
            metadata,
        })
    }
}

/// Guess the structural role of a chunk from its text.
pub fn label_for(text: &str) -> Option<ChunkLabel> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let first = lines.first()?;

    let hashes = first.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&hashes) && first[hashes..].starts_with(' ') {
        return Some(ChunkLabel::Heading);
    }

    let table_rows = lines.iter().filter(|l| l.starts_with('|')).count();
    if table_rows >= 2 && table_rows * 2 > lines.len() {
        return Some(ChunkLabel::Table);
    }

    if lines
        .iter()
        .any(|l| l.starts_with("Figure ") || l.starts_with("Fig. ") || l.starts_with("Image:"))
    {
        return Some(ChunkLabel::ImageCaption);
    }

    None
}

/// Concatenate chunks of one document in order, removing the overlapping
/// prefix of each chunk so the original text is reproduced.
pub fn reconstruct(chunks: &[Chunk]) -> String {
    let mut text = String::new();
    let mut covered: usize = 0;
    for chunk in chunks {
        let skip = covered.saturating_sub(chunk.start);
        text.extend(chunk.text.chars().skip(skip));
        covered = covered.max(chunk.end);
    }
    text
}
