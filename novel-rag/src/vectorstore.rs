//! Vector store trait for storing documents and searching them by meaning.

use async_trait::async_trait;
use serde_json::Value;

use crate::document::{Metadata, NewDocument, SearchResult, VectorDocument};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;

/// A storage backend for embedded documents with similarity search.
///
/// Stores own an [`EmbeddingProvider`](crate::EmbeddingProvider): callers hand
/// over text and the store embeds it on insert and on query. Inserting an
/// existing id replaces the previous document (upsert).
///
/// # Example
///
/// ```rust,ignore
/// use novel_rag::{InMemoryVectorStore, MetadataFilter, VectorStore};
///
/// let store = InMemoryVectorStore::new(embedder);
/// store.add_document("vol1-chunk0", "The keeper lit the lamp.", metadata).await?;
/// let results = store.search("lighthouse", 5, Some(&MetadataFilter::before_volume(2))).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embed `content` and store it under `id`, replacing any existing entry.
    async fn add_document(&self, id: &str, content: &str, metadata: Metadata) -> Result<()>;

    /// Store several documents.
    ///
    /// Documents are written one after another; the batch is not atomic, so
    /// a failure part-way leaves the earlier documents stored. The default
    /// implementation calls [`add_document`](VectorStore::add_document) for
    /// each entry.
    async fn add_documents(&self, documents: &[NewDocument]) -> Result<()> {
        for document in documents {
            self.add_document(&document.id, &document.content, document.metadata.clone()).await?;
        }
        Ok(())
    }

    /// Return up to `top_k` documents most similar to `query`, ordered by
    /// descending score.
    ///
    /// When `filter` is given, only matching documents are ranked.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>>;

    /// Delete a document by id. Returns whether a document was removed.
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete every document matching `filter`. Returns the number removed.
    async fn delete_by_filter(&self, filter: &MetadataFilter) -> Result<u64>;

    /// Remove all documents.
    async fn clear(&self) -> Result<()>;

    /// Number of stored documents.
    async fn size(&self) -> Result<usize>;

    /// Every stored document, in insertion order.
    async fn get_all(&self) -> Result<Vec<VectorDocument>>;

    /// The distinct values stored under a metadata key, across all documents
    /// that have it.
    async fn distinct_values(&self, field: &str) -> Result<Vec<Value>>;
}

/// Reject searches that cannot be answered before calling the embedding model.
pub(crate) fn validate_search(query: &str, top_k: usize) -> Result<()> {
    if query.trim().is_empty() {
        return Err(RagError::InvalidInput("search query must not be empty".into()));
    }
    if top_k == 0 {
        return Err(RagError::InvalidInput("top_k must be greater than zero".into()));
    }
    Ok(())
}

/// Reject documents that cannot be stored before calling the embedding model.
pub(crate) fn validate_document(id: &str, content: &str) -> Result<()> {
    if id.is_empty() {
        return Err(RagError::InvalidInput("document id must not be empty".into()));
    }
    if content.trim().is_empty() {
        return Err(RagError::InvalidInput(format!("document '{id}' has empty content")));
    }
    Ok(())
}
