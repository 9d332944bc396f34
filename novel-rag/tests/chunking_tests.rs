//! Property tests for sentence-aware chunking.

use novel_rag::{Chunker, ParagraphChunker, SentenceChunker, TextChunk};
use proptest::prelude::*;

/// Prose-like text: words, sentence terminators, spaces, newlines and some
/// multi-byte characters.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(
        prop_oneof![
            6 => "[a-z]{1,9}".prop_map(|w| w + " "),
            1 => Just(". ".to_string()),
            1 => Just("! ".to_string()),
            1 => Just("?\n".to_string()),
            1 => Just("\n\n".to_string()),
            1 => Just("é ü ".to_string()),
        ],
        0..400,
    )
    .prop_map(|parts| parts.concat())
}

/// Chunk size and an overlap strictly smaller than it.
fn arb_options() -> impl Strategy<Value = (usize, usize)> {
    (1usize..400).prop_flat_map(|size| (Just(size), 0..size))
}

fn span(text: &str, chunk: &TextChunk) -> String {
    text.chars().skip(chunk.start_char).take(chunk.span_len()).collect()
}

mod prop_sentence_chunker {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Terminates with contiguous indexes and non-empty trimmed content.
        #[test]
        fn indexes_are_contiguous(text in arb_text(), (size, overlap) in arb_options()) {
            let chunker = SentenceChunker::new(size, overlap).unwrap();
            let chunks = chunker.chunk(&text);

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert!(!chunk.content.is_empty());
                let raw = span(&text, chunk);
                prop_assert_eq!(chunk.content.as_str(), raw.trim());
            }
            prop_assert_eq!(chunks.is_empty(), text.trim().is_empty());
        }

        /// Starts strictly increase and no span exceeds the size plus the
        /// sentence search radius.
        #[test]
        fn spans_advance_and_stay_bounded(text in arb_text(), (size, overlap) in arb_options()) {
            let chunks = SentenceChunker::new(size, overlap).unwrap().chunk(&text);
            let len = text.chars().count();

            for chunk in &chunks {
                prop_assert!(chunk.start_char < chunk.end_char);
                prop_assert!(chunk.end_char <= len);
                prop_assert!(chunk.span_len() <= size + 100);
            }
            for pair in chunks.windows(2) {
                prop_assert!(pair[0].start_char < pair[1].start_char);
            }
        }

        /// Every non-whitespace character is inside some chunk span.
        #[test]
        fn every_character_is_covered(text in arb_text(), (size, overlap) in arb_options()) {
            let chunks = SentenceChunker::new(size, overlap).unwrap().chunk(&text);

            for (offset, c) in text.chars().enumerate() {
                if c.is_whitespace() {
                    continue;
                }
                prop_assert!(
                    chunks.iter().any(|ch| ch.start_char <= offset && offset < ch.end_char),
                    "character {:?} at {} not covered",
                    c,
                    offset,
                );
            }
        }
    }
}

mod prop_paragraph_chunker {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Paragraph offsets point at the exact source text.
        #[test]
        fn offsets_match_source(text in arb_text()) {
            let chunks = ParagraphChunker.chunk(&text);
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                let raw = span(&text, chunk);
                prop_assert_eq!(chunk.content.as_str(), raw.trim());
                prop_assert!(!chunk.content.contains("\n\n"));
            }
        }
    }
}

#[test]
fn test_novel_length_text_with_default_options() {
    let sentence = "The keeper climbed the tower and lit the great lamp again. ";
    let text = sentence.repeat(45);
    let chunks = SentenceChunker::default().chunk(&text);

    assert!((3..=4).contains(&chunks.len()), "got {} chunks", chunks.len());
    for chunk in &chunks {
        assert!(chunk.span_len() <= 1100);
        assert!(chunk.content.ends_with('.'));
    }
    for pair in chunks.windows(2) {
        let overlap = pair[0].end_char - pair[1].start_char;
        assert_eq!(overlap, 200);
    }
}
