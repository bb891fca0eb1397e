//! Episodic memory: free-form notes the response agent stores and recalls.
//!
//! Episodes live under `[app, tenant, "episodes"]` keyed by a fresh UUID,
//! with value `{"content", "metadata", "created_at"}`. The embedded text is
//! the content alone.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::{MemoryError, Result};
use crate::store::MemoryStore;
use crate::types::{Namespace, SearchHit};

/// A recalled note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    /// Record key.
    pub id: String,
    /// Note text.
    pub content: String,
    /// Caller-supplied structured metadata (`null` when none was given).
    pub metadata: Value,
    /// When the note was stored.
    pub created_at: DateTime<Utc>,
    /// Similarity to the recall query.
    pub score: f32,
}

impl Episode {
    fn from_hit(hit: SearchHit) -> Result<Self> {
        let SearchHit { record, score } = hit;
        let Some(content) = record.str_field("content").map(str::to_owned) else {
            return Err(MemoryError::Corrupt {
                namespace: record.namespace.to_string(),
                key: record.key,
                reason: "episode has no string `content`".into(),
            });
        };
        let metadata = record.value.get("metadata").cloned().unwrap_or(Value::Null);
        Ok(Self {
            id: record.key,
            content,
            metadata,
            created_at: record.created_at,
            score,
        })
    }
}

/// Store/search primitives behind the agent's memory tools.
#[derive(Clone)]
pub struct EpisodicMemory {
    store: Arc<dyn MemoryStore>,
    app: String,
}

impl std::fmt::Debug for EpisodicMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpisodicMemory")
            .field("app", &self.app)
            .finish_non_exhaustive()
    }
}

impl EpisodicMemory {
    /// Create episodic memory for the given application segment.
    #[must_use]
    pub fn new(store: Arc<dyn MemoryStore>, app: impl Into<String>) -> Self {
        Self {
            store,
            app: app.into(),
        }
    }

    /// Store a note under a fresh key and return that key.
    ///
    /// # Errors
    ///
    /// Returns any store or embedding error.
    pub fn remember(&self, tenant: &str, content: &str, metadata: Value) -> Result<String> {
        let ns = Namespace::episodic(&self.app, tenant)?;
        let id = Uuid::new_v4().to_string();
        let value = json!({
            "content": content,
            "metadata": metadata,
            "created_at": Utc::now().to_rfc3339(),
        });
        self.store.put_with_text(&ns, &id, value, Some(content))?;
        debug!(tenant, id = %id, "episode stored");
        Ok(id)
    }

    /// The `limit` notes most similar to `query`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotIndexed`] on an unindexed store.
    pub fn recall(&self, tenant: &str, query: &str, limit: usize) -> Result<Vec<Episode>> {
        let ns = Namespace::episodic(&self.app, tenant)?;
        self.store
            .search(&ns, query, limit)?
            .into_iter()
            .map(Episode::from_hit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbeddingProvider;
    use crate::store::InMemoryStore;

    fn memory() -> EpisodicMemory {
        let store = InMemoryStore::indexed(Arc::new(HashingEmbeddingProvider::new(128).expect("provider")));
        EpisodicMemory::new(Arc::new(store), "email_assistant")
    }

    #[test]
    fn remember_generates_unique_keys() {
        let mem = memory();
        let a = mem.remember("t1", "Alice prefers mornings", Value::Null).expect("remember");
        let b = mem.remember("t1", "Alice prefers mornings", Value::Null).expect("remember");
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn recall_finds_relevant_note() {
        let mem = memory();
        mem.remember("t1", "Alice prefers morning meetings", json!({"person": "alice"}))
            .expect("remember");
        mem.remember("t1", "Build server moved to rack 4", Value::Null)
            .expect("remember");

        let found = mem.recall("t1", "when does alice like meetings", 1).expect("recall");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content, "Alice prefers morning meetings");
        assert_eq!(found[0].metadata, json!({"person": "alice"}));
    }

    #[test]
    fn recall_is_tenant_scoped() {
        let mem = memory();
        mem.remember("t1", "secret plan", Value::Null).expect("remember");
        assert!(mem.recall("t2", "secret plan", 5).expect("recall").is_empty());
    }

    #[test]
    fn unindexed_store_cannot_recall() {
        let mem = EpisodicMemory::new(Arc::new(InMemoryStore::new()), "app");
        mem.remember("t1", "note", Value::Null).expect("remember");
        assert!(matches!(
            mem.recall("t1", "note", 1),
            Err(MemoryError::NotIndexed { .. })
        ));
    }
}
