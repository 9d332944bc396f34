//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a process-local store backed
//! by a `Vec` protected by a `tokio::sync::RwLock`. It is suitable for
//! development, tests and single-node prototypes; nothing is persisted and
//! the contents live until [`clear`](VectorStore::clear) or process exit.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Metadata, NewDocument, SearchResult, VectorDocument};
use crate::embedding::{EmbeddingProvider, cosine_similarity};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::vectorstore::{VectorStore, validate_document, validate_search};

/// An in-memory vector store using a full scan with cosine similarity.
///
/// Documents keep their insertion slot when replaced, so search ties and
/// [`get_all`](VectorStore::get_all) follow first-insertion order.
///
/// # Example
///
/// ```rust,ignore
/// use novel_rag::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new(Arc::new(embedder));
/// store.add_document("doc-1", "Chapter one.", Metadata::new()).await?;
/// ```
pub struct InMemoryVectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    documents: RwLock<Vec<VectorDocument>>,
}

impl InMemoryVectorStore {
    /// Create a new empty store that embeds with `embedder`.
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder, documents: RwLock::new(Vec::new()) }
    }

    fn check_dimensions(&self, embedding: &[f32]) -> Result<()> {
        let expected = self.embedder.dimensions();
        if embedding.len() != expected {
            return Err(RagError::DimensionMismatch { expected, actual: embedding.len() });
        }
        Ok(())
    }

    fn upsert(documents: &mut Vec<VectorDocument>, document: VectorDocument) {
        match documents.iter_mut().find(|d| d.id == document.id) {
            Some(existing) => *existing = document,
            None => documents.push(document),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add_document(&self, id: &str, content: &str, metadata: Metadata) -> Result<()> {
        validate_document(id, content)?;
        let embedding = self.embedder.embed(content).await?;
        self.check_dimensions(&embedding)?;

        let mut documents = self.documents.write().await;
        let document =
            VectorDocument { id: id.to_string(), content: content.to_string(), embedding, metadata };
        Self::upsert(&mut documents, document);
        debug!(id, total = documents.len(), "stored document in memory");
        Ok(())
    }

    async fn add_documents(&self, batch: &[NewDocument]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        for document in batch {
            validate_document(&document.id, &document.content)?;
        }

        let texts: Vec<&str> = batch.iter().map(|d| d.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != batch.len() {
            return Err(RagError::EmbeddingError {
                provider: "batch".into(),
                message: format!(
                    "expected {} embeddings, provider returned {}",
                    batch.len(),
                    embeddings.len()
                ),
            });
        }
        for embedding in &embeddings {
            self.check_dimensions(embedding)?;
        }

        let mut documents = self.documents.write().await;
        for (document, embedding) in batch.iter().zip(embeddings) {
            Self::upsert(
                &mut documents,
                VectorDocument {
                    id: document.id.clone(),
                    content: document.content.clone(),
                    embedding,
                    metadata: document.metadata.clone(),
                },
            );
        }
        debug!(count = batch.len(), total = documents.len(), "stored batch in memory");
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        validate_search(query, top_k)?;
        let query_embedding = self.embedder.embed_query(query).await?;

        let documents = self.documents.read().await;
        let mut scored = documents
            .iter()
            .filter(|doc| filter.is_none_or(|f| f.matches(&doc.metadata)))
            .map(|doc| {
                let score = cosine_similarity(&query_embedding, &doc.embedding)?;
                Ok(SearchResult { document: doc.clone(), score })
            })
            .collect::<Result<Vec<_>>>()?;

        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);

        debug!(top_k, filtered = filter.is_some(), result_count = scored.len(), "in-memory search");
        Ok(scored)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| d.id != id);
        Ok(documents.len() < before)
    }

    async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<u64> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|d| !filter.matches(&d.metadata));
        let removed = (before - documents.len()) as u64;
        debug!(removed, "deleted documents by filter");
        Ok(removed)
    }

    async fn clear(&self) -> Result<()> {
        self.documents.write().await.clear();
        Ok(())
    }

    async fn size(&self) -> Result<usize> {
        Ok(self.documents.read().await.len())
    }

    async fn get_all(&self) -> Result<Vec<VectorDocument>> {
        Ok(self.documents.read().await.clone())
    }

    async fn distinct_values(&self, field: &str) -> Result<Vec<Value>> {
        let documents = self.documents.read().await;
        let mut values: Vec<Value> = Vec::new();
        for value in documents.iter().filter_map(|d| d.metadata.get(field)) {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        Ok(values)
    }
}
