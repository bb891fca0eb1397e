//! The Memory Store contract and its backends.
//!
//! One interface serves exact lookup and vector similarity search for every
//! memory kind; the kinds differ only in namespace shape and in what text
//! they designate for embedding.
//!
//! Backends:
//! - [`InMemoryStore`] — sharded concurrent maps, process lifetime.
//! - [`SqliteStore`] — a single SQLite file (or `:memory:`), survives restarts.
//!
//! Any type satisfying [`MemoryStore`] can be swapped in without touching the
//! procedural, semantic or episodic layers.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use std::sync::Arc;

use serde_json::Value;

use crate::config::{EmbeddingConfig, StoreConfig};
use crate::embedding::{EmbeddingProvider, HashingEmbeddingProvider, StubEmbeddingProvider};
use crate::error::{MemoryError, Result};
use crate::types::{default_index_text, Namespace, Record, SearchHit};

/// Namespaced key/value storage with optional vector indexing.
///
/// # Guarantees
///
/// - Every operation is confined to the namespace it is given.
/// - A write to `(namespace, key)` is atomic with respect to readers of that
///   key: they observe the old or the new record, never a mix.
/// - Writes to different keys do not block each other on the in-memory
///   backend.
pub trait MemoryStore: Send + Sync {
    /// Store `value` under `(namespace, key)`, replacing any previous value.
    ///
    /// `index_text` designates the text to embed; `None` selects the default
    /// (the value's `text` field, else its canonical JSON). Ignored on an
    /// unindexed store.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the backend write fails.
    fn put_with_text(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        index_text: Option<&str>,
    ) -> Result<()>;

    /// Store `value` only if `key` is absent; return whichever record is
    /// stored afterwards.
    ///
    /// Concurrent callers racing on the same missing key all receive the
    /// single winning record.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the backend write fails.
    fn put_if_absent(&self, namespace: &Namespace, key: &str, value: Value) -> Result<Record>;

    /// Exact lookup. `Ok(None)` means the key does not exist in this namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Record>>;

    /// Rank the records of `namespace` by cosine similarity to `query`.
    ///
    /// Results are ordered by descending score; equal scores put the most
    /// recently created record first. At most `limit` hits are returned.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::NotIndexed`] if the store has no embedding
    /// provider.
    fn search(&self, namespace: &Namespace, query: &str, limit: usize) -> Result<Vec<SearchHit>>;

    /// All records of one namespace, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn list(&self, namespace: &Namespace) -> Result<Vec<Record>>;

    /// Remove a record. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool>;

    /// Whether [`MemoryStore::search`] is available.
    fn is_indexed(&self) -> bool;

    /// Store `value` under `(namespace, key)` using the default index text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the backend write fails.
    fn put(&self, namespace: &Namespace, key: &str, value: Value) -> Result<()> {
        self.put_with_text(namespace, key, value, None)
    }
}

impl<T: MemoryStore + ?Sized> MemoryStore for Arc<T> {
    fn put_with_text(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        index_text: Option<&str>,
    ) -> Result<()> {
        (**self).put_with_text(namespace, key, value, index_text)
    }

    fn put_if_absent(&self, namespace: &Namespace, key: &str, value: Value) -> Result<Record> {
        (**self).put_if_absent(namespace, key, value)
    }

    fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Record>> {
        (**self).get(namespace, key)
    }

    fn search(&self, namespace: &Namespace, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        (**self).search(namespace, query, limit)
    }

    fn list(&self, namespace: &Namespace) -> Result<Vec<Record>> {
        (**self).list(namespace)
    }

    fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool> {
        (**self).delete(namespace, key)
    }

    fn is_indexed(&self) -> bool {
        (**self).is_indexed()
    }
}

// ---------------------------------------------------------------------------
// Shared helpers for backends
// ---------------------------------------------------------------------------

/// Embed the designated text of a value, if the store is indexed.
pub(crate) fn embed_for(
    embedder: Option<&dyn EmbeddingProvider>,
    value: &Value,
    index_text: Option<&str>,
) -> Result<Option<crate::types::Embedding>> {
    let Some(embedder) = embedder else {
        return Ok(None);
    };
    let text = index_text.map_or_else(|| default_index_text(value), str::to_owned);
    embedder.embed(&text).map(Some)
}

/// Score candidates against a query embedding and keep the best `limit`.
pub(crate) fn rank(
    query: &crate::types::Embedding,
    candidates: impl IntoIterator<Item = Record>,
    limit: usize,
) -> Vec<SearchHit> {
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|record| {
            let score = record
                .embedding
                .as_ref()
                .map_or(0.0, |emb| query.cosine_similarity(emb));
            SearchHit { record, score }
        })
        .collect();
    hits.sort_by(|a, b| a.rank_key().cmp(&b.rank_key()));
    hits.truncate(limit);
    hits
}

pub(crate) fn not_indexed(namespace: &Namespace) -> MemoryError {
    MemoryError::NotIndexed {
        namespace: namespace.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Construction from configuration
// ---------------------------------------------------------------------------

/// Build the embedding provider named by the configuration.
///
/// Returns `None` when indexing is disabled (`provider = "none"`).
///
/// # Errors
///
/// Returns [`MemoryError::Config`] for an unknown provider name.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn EmbeddingProvider>>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider.as_str() {
        "none" => return Ok(None),
        "hashing" => {
            let inner = HashingEmbeddingProvider::new(config.dimensions)?;
            match std::num::NonZeroUsize::new(config.cache_capacity) {
                Some(cap) => Arc::new(crate::embedding::CachedEmbeddingProvider::new(inner, cap)),
                None => Arc::new(inner),
            }
        }
        "stub" => Arc::new(StubEmbeddingProvider::new(config.dimensions)),
        other => {
            return Err(MemoryError::Config(format!(
                "unknown embedding provider '{other}' (expected hashing, stub or none)"
            )));
        }
    };
    Ok(Some(provider))
}

/// Build the store backend named by the configuration.
///
/// # Errors
///
/// Returns [`MemoryError::Config`] for an unknown backend, or a database
/// error if the SQLite file cannot be opened.
pub fn build_store(
    store: &StoreConfig,
    embedding: &EmbeddingConfig,
) -> Result<Arc<dyn MemoryStore>> {
    let embedder = build_embedder(embedding)?;
    match store.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::with_embedder(embedder))),
        "sqlite" => {
            let sqlite = match &store.path {
                Some(path) => SqliteStore::open(path, store, embedder)?,
                None => SqliteStore::open_in_memory(store, embedder)?,
            };
            Ok(Arc::new(sqlite))
        }
        other => Err(MemoryError::Config(format!(
            "unknown store backend '{other}' (expected memory or sqlite)"
        ))),
    }
}
