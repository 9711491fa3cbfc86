//! Property tests for chunker coverage and size bounds.

use proptest::prelude::*;
use ragpipe::chunking::{Chunker, TextChunker};

/// Generate prose-like text: words joined by spaces with occasional
/// sentence and paragraph breaks.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(("[a-z]{1,12}", 0u8..10), 1..120).prop_map(|words| {
        let mut text = String::new();
        for (word, roll) in words {
            if !text.is_empty() {
                match roll {
                    0 => text.push_str(". "),
                    1 => text.push_str("\n\n"),
                    _ => text.push(' '),
                }
            }
            text.push_str(&word);
        }
        text
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Every chunk stays within the configured size. No word in this corpus
    /// exceeds the smallest chunk size, so the bound is unconditional.
    #[test]
    fn chunks_respect_the_size_bound(
        text in arb_text(),
        chunk_size in 20usize..120,
        overlap_fraction in 0usize..3,
    ) {
        let chunk_overlap = chunk_size * overlap_fraction / 10;
        let chunker = TextChunker::new(chunk_size, chunk_overlap);

        for chunk in chunker.split(&text) {
            prop_assert!(
                chunk.chars().count() <= chunk_size,
                "chunk of {} chars exceeds size {}: {:?}",
                chunk.chars().count(),
                chunk_size,
                chunk,
            );
        }
    }

    /// No word present in the source is entirely absent from all chunks.
    #[test]
    fn every_source_word_appears_in_some_chunk(
        text in arb_text(),
        chunk_size in 20usize..120,
    ) {
        let chunker = TextChunker::new(chunk_size, chunk_size / 5);
        let chunks = chunker.split(&text);
        let combined = chunks.join("\n");

        for word in text.split(|c: char| !c.is_alphabetic()).filter(|w| !w.is_empty()) {
            prop_assert!(
                combined.contains(word),
                "word {:?} missing from all chunks",
                word,
            );
        }
    }

    /// Chunking is deterministic: the same input always yields the same output.
    #[test]
    fn chunking_is_stateless_and_repeatable(text in arb_text()) {
        let chunker = TextChunker::new(80, 16);
        prop_assert_eq!(chunker.split(&text), chunker.split(&text));
    }
}

#[test]
fn whitespace_only_input_yields_nothing() {
    let chunker = TextChunker::new(50, 10);
    assert!(chunker.split("  \n\t \n\n ").is_empty());
}
