//! Property-based tests
//!
//! Invariants that must hold for all inputs:
//! - The chunker stays bounded, preserves reading order, and never panics
//! - Document ids are deterministic under path normalization
//! - The filter grammar round-trips through render + parse
//!
//! Run with: cargo test --test property_tests

use proptest::prelude::*;

// ============================================================================
// CHUNKER TESTS
// ============================================================================

mod chunker_tests {
    use super::*;
    use vellum::chunking::TextChunker;

    fn word() -> impl Strategy<Value = String> {
        "[a-záéí]{1,10}"
    }

    fn page() -> impl Strategy<Value = String> {
        prop::collection::vec(word(), 0..40).prop_map(|words| words.join(" "))
    }

    fn pages() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(page(), 1..6)
    }

    proptest! {
        /// Invariant: chunking never panics, whatever the input
        #[test]
        fn never_panics(input in prop::collection::vec("\\PC{0,200}", 0..5), size in 1usize..500, overlap in 0usize..100) {
            prop_assume!(overlap < size);
            let chunker = TextChunker::new(size, overlap).unwrap();
            let _ = chunker.chunk(&input);
        }

        /// Invariant: every chunk is non-empty, stripped, and bounded by
        /// chunk_size plus the overlap seed and one joining space
        #[test]
        fn chunks_bounded_and_stripped(input in pages(), size in 20usize..120, overlap in 0usize..19) {
            let chunker = TextChunker::new(size, overlap).unwrap();
            for chunk in chunker.chunk(&input) {
                prop_assert!(!chunk.text.is_empty());
                prop_assert_eq!(chunk.text.trim(), chunk.text.as_str());
                prop_assert!(chunk.text.chars().count() <= size + overlap + 1);
            }
        }

        /// Invariant: page lists are sorted, deduplicated, non-empty, and
        /// drawn from the input page range
        #[test]
        fn pages_sorted_and_in_range(input in pages(), size in 20usize..120) {
            let chunker = TextChunker::new(size, 0).unwrap();
            for chunk in chunker.chunk(&input) {
                prop_assert!(!chunk.pages.is_empty());
                let mut sorted = chunk.pages.clone();
                sorted.sort_unstable();
                sorted.dedup();
                prop_assert_eq!(&sorted, &chunk.pages);
                for page in &chunk.pages {
                    prop_assert!(*page >= 1 && *page as usize <= input.len());
                }
            }
        }

        /// Invariant: with no overlap and no forced mid-word cuts, the
        /// token stream of the chunks equals the token stream of the input
        #[test]
        fn reading_order_preserved(input in pages(), size in 20usize..120) {
            let chunker = TextChunker::new(size, 0).unwrap().with_chapter_detection(false);
            let chunks = chunker.chunk(&input);

            let chunk_tokens: Vec<String> = chunks
                .iter()
                .flat_map(|c| c.text.split_whitespace().map(String::from))
                .collect();
            let input_tokens: Vec<String> = input
                .iter()
                .flat_map(|p| p.split_whitespace().map(String::from))
                .collect();
            prop_assert_eq!(chunk_tokens, input_tokens);
        }
    }
}

// ============================================================================
// DOCUMENT ID TESTS
// ============================================================================

mod document_id_tests {
    use super::*;
    use std::path::Path;
    use vellum::document_id;

    proptest! {
        /// Invariant: document_id never panics on any path-ish string
        #[test]
        fn never_panics(s in "\\PC{0,100}") {
            let _ = document_id(Path::new(&s));
        }

        /// Invariant: ids are 32 lowercase hex chars
        #[test]
        fn id_shape(s in "[a-z0-9/._-]{1,60}") {
            let id = document_id(Path::new(&s));
            prop_assert_eq!(id.len(), 32);
            prop_assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }

        /// Invariant: current-dir components never change the id
        #[test]
        fn normalization_determinism(name in "[a-z0-9_]{1,20}") {
            let plain = document_id(Path::new(&format!("/data/{}", name)));
            let dotted = document_id(Path::new(&format!("/data/./{}", name)));
            let parented = document_id(Path::new(&format!("/data/x/../{}", name)));
            prop_assert_eq!(&plain, &dotted);
            prop_assert_eq!(&plain, &parented);
        }

        /// Invariant: distinct file names yield distinct ids
        #[test]
        fn distinct_paths_distinct_ids(a in "[a-z]{1,12}", b in "[a-z]{1,12}") {
            prop_assume!(a != b);
            prop_assert_ne!(
                document_id(Path::new(&format!("/data/{}", a))),
                document_id(Path::new(&format!("/data/{}", b)))
            );
        }
    }
}

// ============================================================================
// FILTER GRAMMAR TESTS
// ============================================================================

mod filter_tests {
    use super::*;
    use vellum::store::{CmpOp, FilterExpr, Literal};

    fn field() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,10}"
    }

    fn literal() -> impl Strategy<Value = Literal> {
        prop_oneof![
            "[a-zA-Z0-9 _.á-]{0,12}".prop_map(Literal::Str),
            any::<i64>().prop_map(Literal::Int),
            any::<bool>().prop_map(Literal::Bool),
        ]
    }

    fn cmp_op() -> impl Strategy<Value = CmpOp> {
        prop_oneof![
            Just(CmpOp::Eq),
            Just(CmpOp::Ne),
            Just(CmpOp::Gt),
            Just(CmpOp::Ge),
            Just(CmpOp::Lt),
            Just(CmpOp::Le),
        ]
    }

    fn expr() -> impl Strategy<Value = FilterExpr> {
        let leaf = prop_oneof![
            (field(), cmp_op(), literal())
                .prop_map(|(field, op, value)| FilterExpr::Cmp { field, op, value }),
            (field(), prop::collection::vec(literal(), 1..4))
                .prop_map(|(field, values)| FilterExpr::In { field, values }),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 2..4).prop_map(FilterExpr::And),
                prop::collection::vec(inner, 2..4).prop_map(FilterExpr::Or),
            ]
        })
    }

    proptest! {
        /// Invariant: the parser never panics on arbitrary input
        #[test]
        fn parser_never_panics(s in "\\PC{0,80}") {
            let _ = FilterExpr::parse(&s);
        }

        /// Invariant: render + parse is the identity on generated ASTs
        #[test]
        fn render_parse_roundtrip(e in expr()) {
            let rendered = e.to_string();
            let parsed = FilterExpr::parse(&rendered).unwrap();
            prop_assert_eq!(parsed, e);
        }

        /// Invariant: matching a record never panics
        #[test]
        fn matching_never_panics(e in expr(), text in "[a-z,0-9]{0,20}") {
            let record = serde_json::json!({
                "file_id": text,
                "pages": "1,2,3",
            });
            let _ = e.matches(record.as_object().unwrap());
        }
    }
}
