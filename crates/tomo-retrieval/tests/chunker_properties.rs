//! Property tests for the paragraph chunker.

use proptest::prelude::*;
use tomo_retrieval::{chunk_text, ChunkerConfig};

fn arb_config() -> impl Strategy<Value = ChunkerConfig> {
    (1usize..60).prop_flat_map(|max_chars| {
        (0..max_chars).prop_map(move |overlap| ChunkerConfig { max_chars, overlap })
    })
}

// Words with multi-byte letters, paragraphs separated by blank lines
fn arb_text() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-zñáó ]{0,40}", 0..12).prop_map(|p| p.join("\n\n"))
}

proptest! {
    #[test]
    fn prop_chunks_are_bounded_and_non_empty(text in arb_text(), config in arb_config()) {
        for chunk in chunk_text(&text, &config).unwrap() {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.chars().count() <= config.max_chars);
        }
    }

    #[test]
    fn prop_short_paragraphs_stay_whole(text in arb_text(), config in arb_config()) {
        let chunks = chunk_text(&text, &config).unwrap();
        for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
            if paragraph.chars().count() <= config.max_chars {
                prop_assert!(
                    chunks.iter().any(|c| c.contains(paragraph)),
                    "paragraph {:?} not found in {:?}",
                    paragraph,
                    chunks
                );
            }
        }
    }

    #[test]
    fn prop_split_paragraph_is_fully_covered(
        paragraph in "[a-zñáó]{1,200}",
        config in arb_config(),
    ) {
        let chunks = chunk_text(&paragraph, &config).unwrap();

        // Dropping each piece's overlap with its predecessor rebuilds the input
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(config.overlap));
        }
        prop_assert_eq!(rebuilt, paragraph);
    }
}
