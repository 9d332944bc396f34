//! # novel-rag
//!
//! Retrieval core for a spoiler-safe novel reading assistant.
//!
//! ## Overview
//!
//! A book series is ingested one volume at a time. Each volume is split into
//! overlapping chunks, embedded, and stored with its `volumeNumber`. A reader
//! who is on volume `N` only ever receives context from volumes `1..N`.
//!
//! - [`SentenceChunker`] / [`ParagraphChunker`] - text chunking
//! - [`EmbeddingProvider`] - embedding abstraction, with
//!   [`GeminiEmbeddingProvider`] behind the `gemini` feature
//! - [`VectorStore`] - storage and filtered similarity search, implemented by
//!   [`InMemoryVectorStore`] and (with the `pgvector` feature)
//!   [`PgVectorStore`](pgvector::PgVectorStore)
//! - [`VolumeRetriever`] - volume-scoped search, ingestion and context
//!   formatting
//! - [`general_system_prompt`] / [`novel_system_prompt`] - chat prompts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use novel_rag::{InMemoryVectorStore, VolumeRetriever, VolumeUpload, novel_system_prompt};
//!
//! let store = Arc::new(InMemoryVectorStore::new(Arc::new(embedder)));
//! let retriever = VolumeRetriever::new(store);
//!
//! retriever.ingest_volume(&VolumeUpload::new(1, "vol1.txt", volume_one)).await?;
//! retriever.ingest_volume(&VolumeUpload::new(2, "vol2.txt", volume_two)).await?;
//!
//! let context = retriever.context_before_volume("Who is Mara?", 2).await?;
//! let system = novel_system_prompt(2, &context);
//! ```
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `gemini` | [`GeminiEmbeddingProvider`] over the Generative Language REST API |
//! | `pgvector` | `PgVectorStore` on PostgreSQL with the `vector` extension |
//! | `full` | all of the above |

pub mod chunking;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod filter;
#[cfg(feature = "gemini")]
pub mod gemini;
pub mod inmemory;
#[cfg(feature = "pgvector")]
pub mod pgvector;
pub mod prompt;
pub mod retrieval;
pub mod vectorstore;

pub use chunking::{
    ChunkOptions, Chunker, ParagraphChunker, SentenceChunker, chunk_by_paragraphs, chunk_text,
};
pub use config::{RagConfig, RagConfigBuilder};
pub use document::{
    Metadata, NewDocument, SearchResult, TextChunk, VOLUME_NUMBER_KEY, VectorDocument, VolumeInfo,
};
pub use embedding::{EmbeddingProvider, cosine_similarity, is_zero_norm};
pub use error::{RagError, Result};
pub use filter::MetadataFilter;
#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbeddingProvider, TaskType};
pub use inmemory::InMemoryVectorStore;
#[cfg(feature = "pgvector")]
pub use pgvector::{PgVectorConfig, PgVectorStore};
pub use prompt::{general_system_prompt, novel_system_prompt};
pub use retrieval::{VolumeRetriever, VolumeUpload};
pub use vectorstore::VectorStore;
