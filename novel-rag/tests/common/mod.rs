//! Deterministic embedding provider shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use novel_rag::{EmbeddingProvider, RagError, Result};

/// Embeds text as keyword counts over a fixed vocabulary, plus a constant
/// bias component so no embedding is ever the zero vector.
///
/// Texts sharing more of a query's keywords score higher, which makes ranking
/// predictable in tests.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
    calls: AtomicUsize,
    queries: AtomicUsize,
    failing: AtomicBool,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
            calls: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every following call fail with a retryable provider error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of texts embedded so far (single and batch).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of those texts embedded as search queries.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(RagError::EmbeddingError {
                provider: "keyword".into(),
                message: "quota exhausted".into(),
            });
        }
        let lower = text.to_lowercase();
        let words: Vec<&str> =
            lower.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()).collect();

        let mut embedding: Vec<f32> = self
            .vocabulary
            .iter()
            .map(|term| words.iter().filter(|w| *w == term).count() as f32)
            .collect();
        embedding.push(0.1);
        Ok(embedding)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.embed(query).await
    }

    fn dimensions(&self) -> usize {
        self.vocabulary.len() + 1
    }
}

pub const VOCABULARY: &[&str] =
    &["dragon", "lighthouse", "keeper", "storm", "ship", "crown", "river", "sword"];
