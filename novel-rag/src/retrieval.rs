//! Volume-scoped retrieval.
//!
//! The [`VolumeRetriever`] wraps a [`VectorStore`] and enforces the reading
//! position of a series: a reader on volume `N` only ever receives chunks
//! from volumes `1..N`. The restriction is pushed into the store as a
//! [`MetadataFilter`], so it is applied before ranking and truncation.
//!
//! # Example
//!
//! ```rust,ignore
//! use novel_rag::{InMemoryVectorStore, VolumeRetriever, VolumeUpload};
//!
//! let retriever = VolumeRetriever::new(Arc::new(InMemoryVectorStore::new(embedder)));
//! retriever.ingest_volume(&VolumeUpload::new(1, "vol1.txt", text)).await?;
//! let results = retriever.search_before_volume("who is the keeper?", 2, 5).await?;
//! let context = VolumeRetriever::format_context(&results);
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::chunking::{Chunker, SentenceChunker};
use crate::config::RagConfig;
use crate::document::{
    Metadata, NewDocument, SearchResult, VOLUME_NUMBER_KEY, VolumeInfo, volume_from_value,
};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::vectorstore::VectorStore;

/// Separator placed between context blocks by [`VolumeRetriever::format_context`].
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Metadata key holding a chunk's position within its volume.
pub const CHUNK_INDEX_KEY: &str = "chunkIndex";

/// The extracted text of one volume, ready for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeUpload {
    /// The 1-based volume number.
    pub volume_number: u32,
    /// Name of the source file.
    pub filename: String,
    /// Optional series name stored alongside every chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_name: Option<String>,
    /// Plain text of the volume.
    pub text: String,
}

impl VolumeUpload {
    /// Create an upload without a series name.
    pub fn new(volume_number: u32, filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self { volume_number, filename: filename.into(), series_name: None, text: text.into() }
    }

    /// Attach a series name.
    pub fn with_series_name(mut self, series_name: impl Into<String>) -> Self {
        self.series_name = Some(series_name.into());
        self
    }
}

/// Spoiler-safe retrieval over a [`VectorStore`] holding chunks tagged with
/// `volumeNumber`.
pub struct VolumeRetriever {
    store: Arc<dyn VectorStore>,
    chunker: Arc<dyn Chunker>,
    config: RagConfig,
}

impl VolumeRetriever {
    /// Create a retriever with the default configuration and a
    /// [`SentenceChunker`].
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            chunker: Arc::new(SentenceChunker::default()),
            config: RagConfig::default(),
        }
    }

    /// Replace the configuration. The chunker is rebuilt from the new
    /// chunk size and overlap.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ChunkingError`] if the chunk settings are invalid.
    pub fn with_config(mut self, config: RagConfig) -> Result<Self> {
        self.chunker = Arc::new(SentenceChunker::from_config(&config)?);
        self.config = config;
        Ok(self)
    }

    /// Use a different chunker for [`ingest_volume`](Self::ingest_volume).
    pub fn with_chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    /// Return up to `top_k` chunks relevant to `query` taken only from volumes
    /// strictly before `current_volume`.
    ///
    /// A reader on volume 1 has nothing safe to see, so the result is empty
    /// and the embedding model is not called.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `current_volume` or `top_k` is
    /// zero or the query is blank.
    pub async fn search_before_volume(
        &self,
        query: &str,
        current_volume: u32,
        top_k: usize,
    ) -> Result<Vec<SearchResult>> {
        if current_volume == 0 {
            return Err(RagError::InvalidInput("current volume must be at least 1".into()));
        }
        if top_k == 0 {
            return Err(RagError::InvalidInput("top_k must be greater than zero".into()));
        }
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("search query must not be empty".into()));
        }
        if current_volume == 1 {
            debug!(current_volume, "no earlier volumes to search");
            return Ok(Vec::new());
        }

        let filter = MetadataFilter::before_volume(current_volume);
        let results = self.store.search(query, top_k, Some(&filter)).await.map_err(|e| {
            error!(current_volume, error = %e, "volume-scoped search failed");
            e
        })?;

        info!(current_volume, top_k, result_count = results.len(), "volume-scoped search");
        Ok(results)
    }

    /// Search with the configured `top_k` and render the hits with
    /// [`format_context`](Self::format_context).
    pub async fn context_before_volume(&self, query: &str, current_volume: u32) -> Result<String> {
        let results = self.search_before_volume(query, current_volume, self.config.top_k).await?;
        Ok(Self::format_context(&results))
    }

    /// The volume numbers present in the store, ascending and distinct.
    ///
    /// Values that are not positive integers are skipped.
    pub async fn list_indexed_volumes(&self) -> Result<Vec<u32>> {
        let mut volumes: Vec<u32> = self
            .store
            .distinct_values(VOLUME_NUMBER_KEY)
            .await?
            .iter()
            .filter_map(volume_from_value)
            .collect();
        volumes.sort_unstable();
        volumes.dedup();
        Ok(volumes)
    }

    /// Remove every chunk of `volume`. Returns the number of chunks removed.
    pub async fn delete_volume(&self, volume: u32) -> Result<u64> {
        let removed = self.store.delete_by_filter(&MetadataFilter::volume(volume)).await?;
        info!(volume, removed, "deleted volume");
        Ok(removed)
    }

    /// Chunk, embed and store one volume, replacing any chunks previously
    /// stored for the same volume number.
    ///
    /// Chunks are stored under the ids `vol{n}-chunk{i}`, overwriting the
    /// previous ingestion in place; leftover chunks past the new count are
    /// deleted afterwards. If storing fails, the earlier chunks of the volume
    /// stay in the store.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if the volume number is zero, the
    /// filename is empty, or the text yields no chunks.
    pub async fn ingest_volume(&self, upload: &VolumeUpload) -> Result<VolumeInfo> {
        let volume = upload.volume_number;
        if volume == 0 {
            return Err(RagError::InvalidInput("volume number must be at least 1".into()));
        }
        if upload.filename.trim().is_empty() {
            return Err(RagError::InvalidInput("filename must not be empty".into()));
        }

        let chunks = self.chunker.chunk(&upload.text);
        if chunks.is_empty() {
            return Err(RagError::InvalidInput(format!(
                "volume {volume} ('{}') contains no text",
                upload.filename
            )));
        }

        let documents: Vec<NewDocument> = chunks
            .iter()
            .map(|chunk| {
                let mut metadata = Metadata::new();
                metadata.insert(VOLUME_NUMBER_KEY.into(), json!(volume));
                metadata.insert("filename".into(), json!(upload.filename));
                metadata.insert(CHUNK_INDEX_KEY.into(), json!(chunk.index));
                metadata.insert("startChar".into(), json!(chunk.start_char));
                metadata.insert("endChar".into(), json!(chunk.end_char));
                if let Some(series) = &upload.series_name {
                    metadata.insert("seriesName".into(), json!(series));
                }
                NewDocument {
                    id: format!("vol{volume}-chunk{}", chunk.index),
                    content: chunk.content.clone(),
                    metadata,
                }
            })
            .collect();

        // Upsert first so a failed embedding leaves the previous chunks searchable.
        self.store.add_documents(&documents).await.map_err(|e| {
            error!(volume, filename = %upload.filename, error = %e, "volume ingestion failed");
            e
        })?;

        let stale = MetadataFilter::and([
            MetadataFilter::volume(volume),
            MetadataFilter::gte(CHUNK_INDEX_KEY, documents.len() as f64),
        ]);
        let removed = self.store.delete_by_filter(&stale).await?;
        if removed > 0 {
            debug!(volume, removed, "removed stale chunks of previous ingestion");
        }

        info!(volume, filename = %upload.filename, chunk_count = documents.len(), "ingested volume");

        Ok(VolumeInfo {
            volume_number: volume,
            filename: upload.filename.clone(),
            series_name: upload.series_name.clone(),
            chunk_count: documents.len(),
        })
    }

    /// Render search results as a context block for a prompt.
    ///
    /// Each result becomes `[Volume {n}]: {content}`; blocks keep the ranking
    /// order and are joined with [`CONTEXT_SEPARATOR`]. A result without a
    /// valid volume number is labelled `[Volume ?]`. An empty slice renders
    /// as an empty string.
    pub fn format_context(results: &[SearchResult]) -> String {
        results
            .iter()
            .map(|r| match r.document.volume_number() {
                Some(n) => format!("[Volume {n}]: {}", r.document.content),
                None => format!("[Volume ?]: {}", r.document.content),
            })
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }
}
