//! Property tests for chunking coverage and size bounds.

use proptest::prelude::*;
use rag_pipeline::{ChunkUnit, Chunker, ChunkingConfig, Document, RagError, reconstruct};

fn arb_config() -> impl Strategy<Value = ChunkingConfig> {
    (2usize..80)
        .prop_flat_map(|max_size| (Just(max_size), 0..max_size, 0..max_size))
        .prop_map(|(max_size, overlap, min_chunk_size)| ChunkingConfig {
            max_size,
            overlap,
            min_chunk_size,
            unit: ChunkUnit::Characters,
        })
}

/// Chunks of any text reproduce it exactly once their overlaps are removed,
/// and no chunk exceeds the size limit by the merged remainder or more.
mod prop_chunk_coverage {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn chunks_cover_text_in_order(
            text in "[a-zé日 \\n]{0,400}",
            config in arb_config(),
        ) {
            let chunker = Chunker::new(config.clone()).unwrap();
            let document = Document::new("c", "s", "text/plain", text.clone());
            let chunks: Vec<_> = chunker.chunk_document(&document).collect();

            prop_assert_eq!(reconstruct(&chunks), text.clone());

            let total = text.chars().count();
            if total == 0 {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(chunks[0].start, 0);
                prop_assert_eq!(chunks.last().unwrap().end, total);
            }

            let step = config.max_size - config.overlap;
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(chunk.start, i * step);
                let len = chunk.text.chars().count();
                prop_assert_eq!(len, chunk.end - chunk.start);
                prop_assert!(len < config.max_size + config.min_chunk_size.max(1));
                let expected: String = text.chars().skip(chunk.start).take(len).collect();
                prop_assert_eq!(chunk.text.as_str(), expected);
            }
        }

        #[test]
        fn overlap_not_below_size_is_rejected(max_size in 1usize..100, extra in 0usize..10) {
            let config =
                ChunkingConfig { max_size, overlap: max_size + extra, ..ChunkingConfig::default() };
            prop_assert!(matches!(Chunker::new(config), Err(RagError::InvalidConfiguration(_))));
        }
    }
}

#[test]
fn word_chunks_reconstruct_source() {
    let text = "  the quick brown fox jumps over the lazy dog and keeps running far away";
    let chunker = Chunker::new(ChunkingConfig {
        max_size: 4,
        overlap: 1,
        min_chunk_size: 2,
        unit: ChunkUnit::Words,
    })
    .unwrap();
    let document = Document::new("c", "s", "text/plain", text);
    let chunks: Vec<_> = chunker.chunk_document(&document).collect();

    assert!(chunks.len() > 1);
    assert_eq!(reconstruct(&chunks), text);
    for chunk in &chunks {
        assert!(chunk.text.split_whitespace().count() <= 4 + 1);
    }
}
