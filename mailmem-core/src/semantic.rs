//! Semantic memory: labelled examples retrieved as few-shot guidance.
//!
//! Examples live under `[app, tenant, "examples"]` with value
//! `{"input": <payload>, "label": <label>}`. The embedded text is the
//! canonical JSON of the input payload, and queries are canonicalised the
//! same way, so structurally equal payloads always match exactly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::{MemoryError, Result};
use crate::store::MemoryStore;
use crate::types::{canonical_json, Namespace, SearchHit};

/// Canonical text of an input payload: compact JSON with sorted object keys.
#[must_use]
pub fn canonicalize(input: &Value) -> String {
    canonical_json(input)
}

/// One retrieved example.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FewShotExample {
    /// Example id (store key).
    pub key: String,
    /// The stored input payload.
    pub input: Value,
    /// The label it was given.
    pub label: String,
    /// Similarity to the query.
    pub score: f32,
    /// When the example was first stored.
    pub created_at: DateTime<Utc>,
}

impl FewShotExample {
    /// Generic "input → label" block.
    #[must_use]
    pub fn render(&self) -> String {
        format!("Input: {}\n→ {}", canonicalize(&self.input), self.label)
    }

    fn from_hit(hit: SearchHit) -> Result<Self> {
        let SearchHit { record, score } = hit;
        let corrupt = |reason: &str| MemoryError::Corrupt {
            namespace: record.namespace.to_string(),
            key: record.key.clone(),
            reason: reason.to_owned(),
        };
        let input = record
            .value
            .get("input")
            .cloned()
            .ok_or_else(|| corrupt("example has no `input`"))?;
        let label = record
            .str_field("label")
            .ok_or_else(|| corrupt("example has no string `label`"))?
            .to_owned();
        Ok(Self {
            key: record.key,
            input,
            label,
            score,
            created_at: record.created_at,
        })
    }
}

/// Few-shot example storage and similarity retrieval.
#[derive(Clone)]
pub struct SemanticMemory {
    store: Arc<dyn MemoryStore>,
    app: String,
}

impl std::fmt::Debug for SemanticMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticMemory")
            .field("app", &self.app)
            .finish_non_exhaustive()
    }
}

impl SemanticMemory {
    /// Create a retriever for the given application segment.
    #[must_use]
    pub fn new(store: Arc<dyn MemoryStore>, app: impl Into<String>) -> Self {
        Self {
            store,
            app: app.into(),
        }
    }

    fn namespace(&self, tenant: &str) -> Result<Namespace> {
        Namespace::semantic(&self.app, tenant)
    }

    /// Store (or replace) a labelled example.
    ///
    /// # Errors
    ///
    /// Returns any store or embedding error.
    #[instrument(level = "debug", skip(self, input))]
    pub fn add_example(&self, tenant: &str, example_id: &str, input: &Value, label: &str) -> Result<()> {
        let ns = self.namespace(tenant)?;
        let text = canonicalize(input);
        self.store.put_with_text(
            &ns,
            example_id,
            json!({ "input": input, "label": label }),
            Some(&text),
        )
    }

    /// The `limit` stored examples most similar to `current_input`.
    ///
    /// Equal scores favour the most recently created example. A tenant with no
    /// examples yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotIndexed`] on an unindexed store, or
    /// [`MemoryError::Corrupt`] for a malformed example record.
    pub fn retrieve_similar(
        &self,
        tenant: &str,
        current_input: &Value,
        limit: usize,
    ) -> Result<Vec<FewShotExample>> {
        let ns = self.namespace(tenant)?;
        let hits = self.store.search(&ns, &canonicalize(current_input), limit)?;
        let examples = hits
            .into_iter()
            .map(FewShotExample::from_hit)
            .collect::<Result<Vec<_>>>()?;
        debug!(tenant, found = examples.len(), limit, "few-shot examples retrieved");
        Ok(examples)
    }

    /// Number of stored examples for a tenant.
    ///
    /// # Errors
    ///
    /// Returns any store error.
    pub fn count(&self, tenant: &str) -> Result<usize> {
        Ok(self.store.list(&self.namespace(tenant)?)?.len())
    }
}
