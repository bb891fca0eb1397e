//! Core type definitions for the mailmem memory system.
//!
//! All types are serializable so any backend can persist them verbatim.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::{MemoryError, Result};

// ---------------------------------------------------------------------------
// Namespace
// ---------------------------------------------------------------------------

/// Segment that closes the semantic (few-shot example) namespace.
pub const EXAMPLES_SEGMENT: &str = "examples";

/// Segment that closes the episodic (agent notes) namespace.
pub const EPISODES_SEGMENT: &str = "episodes";

/// An ordered, immutable sequence of string segments naming one storage domain.
///
/// Two namespaces are distinct domains even when one is a prefix of the
/// other: `[acme]` and `[acme, examples]` never see each other's records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace(Vec<String>);

impl Namespace {
    /// Create a namespace from its segments.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidNamespace`] if there are no segments or
    /// any segment is empty.
    pub fn new<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(MemoryError::InvalidNamespace("namespace has no segments".into()));
        }
        if let Some(pos) = segments.iter().position(String::is_empty) {
            return Err(MemoryError::InvalidNamespace(format!(
                "segment {pos} of {segments:?} is empty"
            )));
        }
        Ok(Self(segments))
    }

    /// Procedural memory namespace: `[tenant]`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidNamespace`] for an empty tenant.
    pub fn procedural(tenant: &str) -> Result<Self> {
        Self::new([tenant])
    }

    /// Semantic memory namespace: `[app, tenant, "examples"]`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidNamespace`] for an empty app or tenant.
    pub fn semantic(app: &str, tenant: &str) -> Result<Self> {
        Self::new([app, tenant, EXAMPLES_SEGMENT])
    }

    /// Episodic memory namespace: `[app, tenant, "episodes"]`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidNamespace`] for an empty app or tenant.
    pub fn episodic(app: &str, tenant: &str) -> Result<Self> {
        Self::new([app, tenant, EPISODES_SEGMENT])
    }

    /// The segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; a namespace cannot be constructed without segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Unambiguous storage form (JSON array of segments).
    ///
    /// Unlike a joined path this cannot collide when a segment contains `/`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| self.to_string())
    }

    /// Parse the form produced by [`Namespace::storage_key`].
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a JSON array of valid segments.
    pub fn from_storage_key(key: &str) -> Result<Self> {
        let segments: Vec<String> = serde_json::from_str(key)?;
        Self::new(segments)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A dense vector embedding for similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(pub Vec<f32>);

impl Embedding {
    /// Cosine similarity between two embeddings.
    /// Returns 0.0 if the dimensions differ or either vector is zero.
    #[must_use]
    pub fn cosine_similarity(&self, other: &Self) -> f32 {
        crate::embedding::cosine_similarity(self, other)
    }

    /// Dimensionality of the embedding.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

/// One stored value: `(namespace, key, value, embedding, timestamps)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Storage domain the record lives in.
    pub namespace: Namespace,
    /// Unique key within the namespace.
    pub key: String,
    /// Arbitrary structured payload (a JSON object by convention).
    pub value: Value,
    /// Vector derived from the record's text; present only on indexed stores.
    pub embedding: Option<Embedding>,
    /// When the key was first written. Preserved across overwrites.
    pub created_at: DateTime<Utc>,
    /// When the value was last replaced.
    pub updated_at: DateTime<Utc>,
}

impl Record {
    /// Read a string field from the value, if present.
    #[must_use]
    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.value.get(field).and_then(Value::as_str)
    }
}

/// A record returned by vector search together with its similarity score.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// The matching record.
    pub record: Record,
    /// Cosine similarity between the query and the record, in \[-1, 1\].
    pub score: f32,
}

impl SearchHit {
    /// Total-order sort key: higher score first, then most recent, then key.
    #[must_use]
    pub fn rank_key(&self) -> (std::cmp::Reverse<OrderedFloat<f32>>, std::cmp::Reverse<DateTime<Utc>>, &str) {
        (
            std::cmp::Reverse(OrderedFloat(self.score)),
            std::cmp::Reverse(self.record.created_at),
            self.record.key.as_str(),
        )
    }
}

// ---------------------------------------------------------------------------
// Canonical text
// ---------------------------------------------------------------------------

/// Canonical compact JSON text for a value: object keys sorted, no whitespace.
///
/// Two structurally equal payloads always canonicalize to the same string,
/// which is what makes their embeddings identical.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    sort_keys(value).to_string()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Text a store embeds for a value when the caller does not designate one:
/// the string field `text` if present, otherwise the canonical JSON.
#[must_use]
pub fn default_index_text(value: &Value) -> String {
    value
        .get("text")
        .and_then(Value::as_str)
        .map_or_else(|| canonical_json(value), str::to_owned)
}
