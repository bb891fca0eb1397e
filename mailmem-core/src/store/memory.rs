//! In-process store backed by `dashmap`.
//!
//! Layout: one outer map from namespace to an inner `key → Record` map. The
//! inner map is reference-counted so an operation only holds the outer shard
//! lock long enough to clone the handle; record-level work then contends
//! only on the inner map's shard for that key.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, trace};

use super::{embed_for, not_indexed, rank, MemoryStore};
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::types::{Namespace, Record, SearchHit};

type Shelf = Arc<DashMap<String, Record>>;

/// Concurrent in-memory [`MemoryStore`].
#[derive(Default)]
pub struct InMemoryStore {
    namespaces: DashMap<Namespace, Shelf>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryStore")
            .field("namespaces", &self.namespaces.len())
            .field("indexed", &self.embedder.is_some())
            .finish()
    }
}

impl InMemoryStore {
    /// Create a store without vector indexing (`search` is unavailable).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a vector-indexed store.
    #[must_use]
    pub fn indexed(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_embedder(Some(embedder))
    }

    /// Create a store with an optional embedding provider.
    #[must_use]
    pub fn with_embedder(embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            namespaces: DashMap::new(),
            embedder,
        }
    }

    /// Number of records in one namespace.
    #[must_use]
    pub fn len(&self, namespace: &Namespace) -> usize {
        self.shelf(namespace).map_or(0, |s| s.len())
    }

    /// Whether the namespace holds no records.
    #[must_use]
    pub fn is_empty(&self, namespace: &Namespace) -> bool {
        self.len(namespace) == 0
    }

    fn shelf(&self, namespace: &Namespace) -> Option<Shelf> {
        self.namespaces.get(namespace).map(|s| Arc::clone(s.value()))
    }

    fn shelf_or_create(&self, namespace: &Namespace) -> Shelf {
        if let Some(shelf) = self.shelf(namespace) {
            return shelf;
        }
        Arc::clone(self.namespaces.entry(namespace.clone()).or_default().value())
    }
}

impl MemoryStore for InMemoryStore {
    fn put_with_text(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        index_text: Option<&str>,
    ) -> Result<()> {
        let embedding = embed_for(self.embedder.as_deref(), &value, index_text)?;
        let now = Utc::now();
        let shelf = self.shelf_or_create(namespace);

        match shelf.entry(key.to_owned()) {
            Entry::Occupied(mut slot) => {
                let created_at = slot.get().created_at;
                slot.insert(Record {
                    namespace: namespace.clone(),
                    key: key.to_owned(),
                    value,
                    embedding,
                    created_at,
                    updated_at: now,
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(Record {
                    namespace: namespace.clone(),
                    key: key.to_owned(),
                    value,
                    embedding,
                    created_at: now,
                    updated_at: now,
                });
            }
        }

        trace!(namespace = %namespace, key, "put");
        Ok(())
    }

    fn put_if_absent(&self, namespace: &Namespace, key: &str, value: Value) -> Result<Record> {
        if let Some(existing) = self.get(namespace, key)? {
            return Ok(existing);
        }

        let embedding = embed_for(self.embedder.as_deref(), &value, None)?;
        let now = Utc::now();
        let shelf = self.shelf_or_create(namespace);
        let record = shelf
            .entry(key.to_owned())
            .or_insert_with(|| {
                debug!(namespace = %namespace, key, "initialised missing record");
                Record {
                    namespace: namespace.clone(),
                    key: key.to_owned(),
                    value,
                    embedding,
                    created_at: now,
                    updated_at: now,
                }
            })
            .value()
            .clone();
        Ok(record)
    }

    fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Record>> {
        Ok(self
            .shelf(namespace)
            .and_then(|shelf| shelf.get(key).map(|r| r.value().clone())))
    }

    fn search(&self, namespace: &Namespace, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(embedder) = self.embedder.as_deref() else {
            return Err(not_indexed(namespace));
        };
        let query_embedding = embedder.embed(query)?;
        let Some(shelf) = self.shelf(namespace) else {
            return Ok(Vec::new());
        };

        let candidates: Vec<Record> = shelf.iter().map(|r| r.value().clone()).collect();
        let hits = rank(&query_embedding, candidates, limit);
        trace!(namespace = %namespace, hits = hits.len(), "search");
        Ok(hits)
    }

    fn list(&self, namespace: &Namespace) -> Result<Vec<Record>> {
        let mut records: Vec<Record> = self
            .shelf(namespace)
            .map(|shelf| shelf.iter().map(|r| r.value().clone()).collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool> {
        Ok(self
            .shelf(namespace)
            .is_some_and(|shelf| shelf.remove(key).is_some()))
    }

    fn is_indexed(&self) -> bool {
        self.embedder.is_some()
    }
}
