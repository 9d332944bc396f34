//! Data types for chunks, stored documents, and search results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open-ended metadata attached to a stored document.
///
/// Values are arbitrary JSON so that new fields (`volumeNumber`, `filename`,
/// `chunkIndex`, ...) need no schema change in any backend.
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key holding the 1-based volume a chunk was taken from.
pub const VOLUME_NUMBER_KEY: &str = "volumeNumber";

/// A contiguous segment of source text produced by a [`Chunker`](crate::Chunker).
///
/// `start_char` and `end_char` are raw offsets into the source, counted in
/// characters (Unicode scalar values), before `content` was trimmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TextChunk {
    /// The trimmed text of the chunk.
    pub content: String,
    /// Position of the chunk in the returned sequence, starting at 0.
    pub index: usize,
    /// Offset of the first character covered by the chunk.
    pub start_char: usize,
    /// Offset one past the last character covered by the chunk.
    pub end_char: usize,
}

impl TextChunk {
    /// Number of characters in the raw (untrimmed) span.
    pub fn span_len(&self) -> usize {
        self.end_char - self.start_char
    }
}

/// A document held by a [`VectorStore`](crate::VectorStore).
///
/// Identity is the `id`: storing a document with an existing id replaces the
/// previous content, embedding and metadata together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorDocument {
    /// Unique identifier.
    pub id: String,
    /// The text that was embedded.
    pub content: String,
    /// The embedding of `content`. Backends may leave this empty in search
    /// results.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Key-value metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorDocument {
    /// The `volumeNumber` metadata value, if present and a positive integer.
    ///
    /// Integral floats such as `3.0` count as integers.
    pub fn volume_number(&self) -> Option<u32> {
        self.metadata.get(VOLUME_NUMBER_KEY).and_then(volume_from_value)
    }
}

/// Parse a metadata value as a 1-based volume number.
pub(crate) fn volume_from_value(value: &Value) -> Option<u32> {
    let Value::Number(number) = value else {
        return None;
    };
    let n = match number.as_u64() {
        Some(n) => n,
        // JSONB may hand back integral floats such as `3.0`.
        None => {
            let f = number.as_f64().filter(|f| f.fract() == 0.0 && *f >= 1.0)?;
            if f > f64::from(u32::MAX) {
                return None;
            }
            f as u64
        }
    };
    u32::try_from(n).ok().filter(|n| *n > 0)
}

/// A document waiting to be embedded and stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewDocument {
    /// Unique identifier.
    pub id: String,
    /// Text to embed and store.
    pub content: String,
    /// Key-value metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewDocument {
    /// Create a new document with empty metadata.
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { id: id.into(), content: content.into(), metadata: Metadata::new() }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A retrieved [`VectorDocument`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved document.
    pub document: VectorDocument,
    /// The cosine similarity score (higher is more relevant).
    pub score: f32,
}

/// Summary of one ingested volume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeInfo {
    /// The 1-based volume number.
    pub volume_number: u32,
    /// Name of the file the text was extracted from.
    pub filename: String,
    /// Optional name of the series the volume belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series_name: Option<String>,
    /// Number of chunks stored for the volume.
    pub chunk_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_volume_number_requires_positive_integer() {
        let mut doc = VectorDocument {
            id: "a".into(),
            content: "text".into(),
            embedding: vec![],
            metadata: Metadata::new(),
        };
        assert_eq!(doc.volume_number(), None);

        doc.metadata.insert(VOLUME_NUMBER_KEY.into(), json!(3));
        assert_eq!(doc.volume_number(), Some(3));

        doc.metadata.insert(VOLUME_NUMBER_KEY.into(), json!(0));
        assert_eq!(doc.volume_number(), None);

        doc.metadata.insert(VOLUME_NUMBER_KEY.into(), json!("3"));
        assert_eq!(doc.volume_number(), None);

        doc.metadata.insert(VOLUME_NUMBER_KEY.into(), json!(3.0));
        assert_eq!(doc.volume_number(), Some(3));
    }

    #[test]
    fn test_volume_from_value() {
        assert_eq!(volume_from_value(&json!(3)), Some(3));
        assert_eq!(volume_from_value(&json!(3.0)), Some(3));
        assert_eq!(volume_from_value(&json!(0)), None);
        assert_eq!(volume_from_value(&json!(-1)), None);
        assert_eq!(volume_from_value(&json!(2.5)), None);
        assert_eq!(volume_from_value(&json!(5e9)), None);
        assert_eq!(volume_from_value(&json!("2")), None);
    }

    #[test]
    fn test_empty_embedding_is_omitted_from_json() {
        let doc = VectorDocument {
            id: "a".into(),
            content: "text".into(),
            embedding: vec![],
            metadata: Metadata::new(),
        };
        let value = serde_json::to_value(&doc).unwrap();
        assert!(value.get("embedding").is_none());
    }

    #[test]
    fn test_text_chunk_serializes_camel_case() {
        let chunk = TextChunk { content: "x".into(), index: 0, start_char: 2, end_char: 5 };
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value, json!({"content": "x", "index": 0, "startChar": 2, "endChar": 5}));
        assert_eq!(chunk.span_len(), 3);
    }
}
