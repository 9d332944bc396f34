//! Metadata predicates applied by vector stores before ranking.
//!
//! A [`MetadataFilter`] restricts which documents take part in a search. Stores
//! apply it before similarity ranking and `top_k` truncation, so a sparse
//! filter never under-returns because better-scoring excluded documents
//! filled the result window.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Metadata, VOLUME_NUMBER_KEY};

/// A predicate over a document's [`Metadata`].
///
/// Numeric comparisons only match JSON numbers; a missing field or a field of
/// another type never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MetadataFilter {
    /// `field == value` (JSON equality).
    Eq {
        /// Metadata key.
        field: String,
        /// Expected value.
        value: Value,
    },
    /// `field < value`.
    Lt {
        /// Metadata key.
        field: String,
        /// Exclusive upper bound.
        value: f64,
    },
    /// `field <= value`.
    Lte {
        /// Metadata key.
        field: String,
        /// Inclusive upper bound.
        value: f64,
    },
    /// `field > value`.
    Gt {
        /// Metadata key.
        field: String,
        /// Exclusive lower bound.
        value: f64,
    },
    /// `field >= value`.
    Gte {
        /// Metadata key.
        field: String,
        /// Inclusive lower bound.
        value: f64,
    },
    /// All nested filters must match. An empty list matches everything.
    And {
        /// Nested filters.
        filters: Vec<MetadataFilter>,
    },
}

impl MetadataFilter {
    /// Build an equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq { field: field.into(), value: value.into() }
    }

    /// Build a `field < value` filter.
    pub fn lt(field: impl Into<String>, value: f64) -> Self {
        Self::Lt { field: field.into(), value }
    }

    /// Build a `field <= value` filter.
    pub fn lte(field: impl Into<String>, value: f64) -> Self {
        Self::Lte { field: field.into(), value }
    }

    /// Build a `field > value` filter.
    pub fn gt(field: impl Into<String>, value: f64) -> Self {
        Self::Gt { field: field.into(), value }
    }

    /// Build a `field >= value` filter.
    pub fn gte(field: impl Into<String>, value: f64) -> Self {
        Self::Gte { field: field.into(), value }
    }

    /// Combine filters with logical AND.
    pub fn and(filters: impl IntoIterator<Item = MetadataFilter>) -> Self {
        Self::And { filters: filters.into_iter().collect() }
    }

    /// Documents from volumes strictly before `volume`.
    pub fn before_volume(volume: u32) -> Self {
        Self::lt(VOLUME_NUMBER_KEY, f64::from(volume))
    }

    /// Documents from exactly `volume`.
    pub fn volume(volume: u32) -> Self {
        Self::eq(VOLUME_NUMBER_KEY, volume)
    }

    /// Evaluate the filter against a metadata map.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        let number = |field: &str| metadata.get(field).and_then(Value::as_f64);
        match self {
            Self::Eq { field, value } => metadata.get(field).is_some_and(|v| json_eq(v, value)),
            Self::Lt { field, value } => number(field).is_some_and(|n| n < *value),
            Self::Lte { field, value } => number(field).is_some_and(|n| n <= *value),
            Self::Gt { field, value } => number(field).is_some_and(|n| n > *value),
            Self::Gte { field, value } => number(field).is_some_and(|n| n >= *value),
            Self::And { filters } => filters.iter().all(|f| f.matches(metadata)),
        }
    }
}

/// JSON equality where numbers compare by value, so `3` equals `3.0` the way
/// they do in a JSONB column.
fn json_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}
