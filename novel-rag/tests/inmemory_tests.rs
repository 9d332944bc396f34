//! Property tests for in-memory vector store search ordering and filtering.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use common::{KeywordEmbedder, VOCABULARY};
use novel_rag::{InMemoryVectorStore, MetadataFilter, NewDocument, VectorStore};
use proptest::prelude::*;

/// Generate text made of vocabulary words.
fn arb_text() -> impl Strategy<Value = String> {
    proptest::collection::vec(proptest::sample::select(VOCABULARY), 1..6)
        .prop_map(|words| words.join(" "))
}

/// Generate a document tagged with a volume number in `1..=5`.
fn arb_document() -> impl Strategy<Value = NewDocument> {
    ("[a-z]{3,8}", arb_text(), 1u32..=5).prop_map(|(id, text, volume)| {
        NewDocument::new(id, text).with_metadata("volumeNumber", volume)
    })
}

fn dedup(documents: &[NewDocument]) -> Vec<NewDocument> {
    let mut seen: HashMap<String, NewDocument> = HashMap::new();
    for document in documents {
        seen.entry(document.id.clone()).or_insert_with(|| document.clone());
    }
    seen.into_values().collect()
}

/// Search returns at most `top_k` results ordered by descending cosine
/// similarity.
mod prop_inmemory_search_ordering {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn results_ordered_descending_and_bounded_by_top_k(
            documents in proptest::collection::vec(arb_document(), 1..20),
            query in arb_text(),
            top_k in 1usize..25,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let (results, unique_count) = rt.block_on(async {
                let store = InMemoryVectorStore::new(Arc::new(KeywordEmbedder::new(VOCABULARY)));
                let unique = dedup(&documents);
                store.add_documents(&unique).await.unwrap();
                let results = store.search(&query, top_k, None).await.unwrap();
                (results, unique.len())
            });

            prop_assert!(results.len() <= top_k);
            prop_assert_eq!(results.len(), top_k.min(unique_count));

            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
            for result in &results {
                prop_assert!((-1.0..=1.0).contains(&result.score));
            }
        }
    }
}

/// A volume filter is applied before truncation: every returned document
/// matches, and as many matching documents are returned as fit in `top_k`.
mod prop_inmemory_filter_before_truncation {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn filtered_results_all_match_and_fill_window(
            documents in proptest::collection::vec(arb_document(), 1..20),
            query in arb_text(),
            current in 1u32..=6,
            top_k in 1usize..10,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let unique = dedup(&documents);
            let filter = MetadataFilter::before_volume(current);
            let eligible = unique.iter().filter(|d| filter.matches(&d.metadata)).count();

            let results = rt.block_on(async {
                let store = InMemoryVectorStore::new(Arc::new(KeywordEmbedder::new(VOCABULARY)));
                store.add_documents(&unique).await.unwrap();
                store.search(&query, top_k, Some(&filter)).await.unwrap()
            });

            prop_assert_eq!(results.len(), top_k.min(eligible));
            for result in &results {
                let volume = result.document.volume_number().unwrap();
                prop_assert!(volume < current);
            }
        }
    }
}

#[tokio::test]
async fn test_upsert_is_idempotent() {
    let store = InMemoryVectorStore::new(Arc::new(KeywordEmbedder::new(VOCABULARY)));
    let document = NewDocument::new("a", "dragon storm").with_metadata("volumeNumber", 1);

    store.add_documents(std::slice::from_ref(&document)).await.unwrap();
    store.add_documents(std::slice::from_ref(&document)).await.unwrap();
    assert_eq!(store.size().await.unwrap(), 1);

    store.add_document("a", "river crown", document.metadata.clone()).await.unwrap();
    let all = store.get_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].content, "river crown");
}

#[tokio::test]
async fn test_get_all_keeps_insertion_order_across_replacement() {
    let store = InMemoryVectorStore::new(Arc::new(KeywordEmbedder::new(VOCABULARY)));
    for id in ["first", "second", "third"] {
        store.add_document(id, "ship", Default::default()).await.unwrap();
    }
    store.add_document("first", "sword", Default::default()).await.unwrap();

    let ids: Vec<String> = store.get_all().await.unwrap().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, ["first", "second", "third"]);
}

#[tokio::test]
async fn test_equal_scores_keep_insertion_order() {
    let store = InMemoryVectorStore::new(Arc::new(KeywordEmbedder::new(VOCABULARY)));
    for id in ["c", "a", "b"] {
        store.add_document(id, "The keeper and the ship.", Default::default()).await.unwrap();
    }
    store.add_document("other", "sword", Default::default()).await.unwrap();

    let results = store.search("keeper ship", 3, None).await.unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.document.id.as_str()).collect();
    assert_eq!(ids, ["c", "a", "b"]);
    assert!(results.windows(2).all(|w| w[0].score == w[1].score));

    let top_two = store.search("keeper ship", 2, None).await.unwrap();
    assert_eq!(top_two[0].document.id, "c");
    assert_eq!(top_two[1].document.id, "a");
}

#[tokio::test]
async fn test_delete_and_clear() {
    let store = InMemoryVectorStore::new(Arc::new(KeywordEmbedder::new(VOCABULARY)));
    store
        .add_documents(&[
            NewDocument::new("a", "dragon").with_metadata("volumeNumber", 1),
            NewDocument::new("b", "keeper").with_metadata("volumeNumber", 2),
            NewDocument::new("c", "storm").with_metadata("volumeNumber", 2),
        ])
        .await
        .unwrap();

    assert!(store.delete("a").await.unwrap());
    assert!(!store.delete("a").await.unwrap());
    assert_eq!(store.delete_by_filter(&MetadataFilter::volume(2)).await.unwrap(), 2);
    assert_eq!(store.size().await.unwrap(), 0);

    store.add_document("d", "crown", Default::default()).await.unwrap();
    store.clear().await.unwrap();
    assert_eq!(store.size().await.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_search_is_rejected_before_embedding() {
    let embedder = Arc::new(KeywordEmbedder::new(VOCABULARY));
    let store = InMemoryVectorStore::new(embedder.clone());

    assert!(store.search("", 5, None).await.is_err());
    assert!(store.search("dragon", 0, None).await.is_err());
    assert!(store.add_document("", "dragon", Default::default()).await.is_err());
    assert!(store.add_document("x", "   ", Default::default()).await.is_err());
    assert_eq!(embedder.calls(), 0);
}

#[tokio::test]
async fn test_search_embeds_query_as_query() {
    let embedder = Arc::new(KeywordEmbedder::new(VOCABULARY));
    let store = InMemoryVectorStore::new(embedder.clone());
    store.add_document("a", "dragon", Default::default()).await.unwrap();
    assert_eq!(embedder.queries(), 0);

    store.search("dragon", 1, None).await.unwrap();
    assert_eq!(embedder.queries(), 1);
    assert_eq!(embedder.calls(), 2);
}

#[tokio::test]
async fn test_search_on_empty_store_returns_nothing() {
    let store = InMemoryVectorStore::new(Arc::new(KeywordEmbedder::new(VOCABULARY)));
    assert!(store.search("dragon", 3, None).await.unwrap().is_empty());
}
