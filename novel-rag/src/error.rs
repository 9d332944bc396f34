//! Error types for the `novel-rag` crate.

use thiserror::Error;

/// Errors that can occur in RAG operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A caller-supplied argument was rejected before any external call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Two embeddings of different lengths were compared.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length of the reference embedding.
        expected: usize,
        /// Length of the offending embedding.
        actual: usize,
    },

    /// An external call did not complete within its deadline.
    #[error("Timed out during {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },
}

impl RagError {
    /// Whether the caller may retry the failed operation.
    ///
    /// External-call failures and timeouts are retryable; validation and
    /// degenerate-data errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingError { .. }
                | RagError::VectorStoreError { .. }
                | RagError::Timeout { .. }
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let timeout = RagError::Timeout { operation: "embed".into() };
        assert!(timeout.is_retryable());

        let store = RagError::VectorStoreError { backend: "pgvector".into(), message: "x".into() };
        assert!(store.is_retryable());

        assert!(!RagError::InvalidInput("empty query".into()).is_retryable());
        assert!(!RagError::DimensionMismatch { expected: 3, actual: 4 }.is_retryable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = RagError::DimensionMismatch { expected: 768, actual: 3 };
        assert_eq!(err.to_string(), "Embedding dimension mismatch: expected 768, got 3");
    }
}
