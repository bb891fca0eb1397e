//! SQLite backend for the Memory Store.
//!
//! Every record of every namespace lives in one table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS records (
//!     namespace  TEXT NOT NULL,
//!     key        TEXT NOT NULL,
//!     value      BLOB NOT NULL,
//!     embedding  BLOB,
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT,
//!     PRIMARY KEY (namespace, key)
//! );
//! ```
//!
//! - The namespace column holds the JSON-array form of the segments, so
//!   `["a/b"]` and `["a", "b"]` never share rows.
//! - Values are JSON bytes; embeddings are little-endian `f32` bytes.
//! - Optional CRC-32 of the value bytes detects on-disk corruption.
//! - WAL mode keeps readers unblocked during writes.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::{embed_for, not_indexed, rank, MemoryStore};
use crate::config::StoreConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, Result};
use crate::types::{Embedding, Namespace, Record, SearchHit};
use std::sync::Arc;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
    namespace  TEXT NOT NULL,
    key        TEXT NOT NULL,
    value      BLOB NOT NULL,
    embedding  BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT,
    PRIMARY KEY (namespace, key)
);";

const SELECT_COLUMNS: &str = "SELECT key, value, embedding, created_at, updated_at, checksum FROM records";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309 / ITU-T V.42), bitwise.
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

fn encode_embedding(embedding: &Embedding) -> Vec<u8> {
    embedding.0.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Option<Embedding> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(Embedding(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    ))
}

/// One row as read from SQLite, before validation.
struct RawRow {
    key: String,
    value: Vec<u8>,
    embedding: Option<Vec<u8>>,
    created_at: String,
    updated_at: String,
    checksum: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            value: row.get(1)?,
            embedding: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            checksum: row.get(5)?,
        })
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// [`MemoryStore`] persisted in a SQLite database.
///
/// The connection sits behind a `parking_lot::Mutex`, so statements are
/// serialised; each write is a single upsert statement and therefore atomic
/// for its key.
///
/// ```no_run
/// # use mailmem_core::{SqliteStore, MemoryStore, Namespace};
/// # use mailmem_core::config::StoreConfig;
/// let store = SqliteStore::open("mail.db", &StoreConfig::default(), None)?;
/// let ns = Namespace::procedural("acme")?;
/// store.put(&ns, "respond_rule", serde_json::json!({"text": "Direct questions"}))?;
/// # Ok::<(), mailmem_core::MemoryError>(())
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    checksum_enabled: bool,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("indexed", &self.embedder.is_some())
            .field("checksum_enabled", &self.checksum_enabled)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) a database file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(
        path: P,
        config: &StoreConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            indexed = embedder.is_some(),
            "SQLite memory store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            checksum_enabled: config.checksum_enabled,
            db_path,
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn open_in_memory(
        config: &StoreConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            checksum_enabled: config.checksum_enabled,
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the database file (`:memory:` for in-memory stores).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run SQLite's integrity check. `Ok(false)` means corruption was found.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let conn = self.conn.lock();
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Memory store backup completed"
        );
        Ok(())
    }

    fn decode(&self, namespace: &Namespace, raw: RawRow) -> Result<Record> {
        let corrupt = |reason: String| MemoryError::Corrupt {
            namespace: namespace.to_string(),
            key: raw.key.clone(),
            reason,
        };

        if self.checksum_enabled {
            if let Some(expected) = raw.checksum.as_deref() {
                let actual = crc32_hex(&raw.value);
                if expected != actual {
                    warn!(
                        namespace = %namespace,
                        key = %raw.key,
                        expected,
                        actual = %actual,
                        "Checksum mismatch; record may be corrupt"
                    );
                }
            }
        }

        let value: Value = serde_json::from_slice(&raw.value)
            .map_err(|e| corrupt(format!("value is not JSON: {e}")))?;
        let embedding = match raw.embedding.as_deref() {
            Some(bytes) => Some(
                decode_embedding(bytes)
                    .ok_or_else(|| corrupt(format!("embedding blob has {} bytes", bytes.len())))?,
            ),
            None => None,
        };
        let created_at = parse_timestamp(&raw.created_at).map_err(&corrupt)?;
        let updated_at = parse_timestamp(&raw.updated_at).map_err(&corrupt)?;

        Ok(Record {
            namespace: namespace.clone(),
            key: raw.key,
            value,
            embedding,
            created_at,
            updated_at,
        })
    }

    fn load_namespace(&self, namespace: &Namespace) -> Result<Vec<Record>> {
        let ns_key = namespace.storage_key();
        let rows: Vec<RawRow> = {
            let conn = self.conn.lock();
            let mut stmt =
                conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE namespace = ?1 ORDER BY key"))?;
            let mapped = stmt.query_map(params![ns_key], RawRow::from_row)?;
            mapped.collect::<rusqlite::Result<_>>()?
        };
        rows.into_iter().map(|raw| self.decode(namespace, raw)).collect()
    }

    fn load_one(&self, conn: &Connection, namespace: &Namespace, key: &str) -> Result<Option<RawRow>> {
        let mut stmt =
            conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE namespace = ?1 AND key = ?2"))?;
        Ok(stmt
            .query_row(params![namespace.storage_key(), key], RawRow::from_row)
            .optional()?)
    }

    fn checksum_for(&self, bytes: &[u8]) -> Option<String> {
        self.checksum_enabled.then(|| crc32_hex(bytes))
    }
}

fn parse_timestamp(text: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{text}': {e}"))
}

impl MemoryStore for SqliteStore {
    fn put_with_text(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        index_text: Option<&str>,
    ) -> Result<()> {
        let start = Instant::now();
        let embedding = embed_for(self.embedder.as_deref(), &value, index_text)?;
        let bytes = serde_json::to_vec(&value)?;
        let checksum = self.checksum_for(&bytes);
        let now = Utc::now().to_rfc3339();

        self.conn.lock().execute(
            "INSERT INTO records (namespace, key, value, embedding, created_at, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)
             ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                embedding = excluded.embedding,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![
                namespace.storage_key(),
                key,
                bytes,
                embedding.as_ref().map(encode_embedding),
                now,
                checksum
            ],
        )?;

        debug!(
            namespace = %namespace,
            key,
            bytes = bytes.len(),
            elapsed_us = start.elapsed().as_micros(),
            "put"
        );
        Ok(())
    }

    fn put_if_absent(&self, namespace: &Namespace, key: &str, value: Value) -> Result<Record> {
        if let Some(existing) = self.get(namespace, key)? {
            return Ok(existing);
        }

        let embedding = embed_for(self.embedder.as_deref(), &value, None)?;
        let bytes = serde_json::to_vec(&value)?;
        let checksum = self.checksum_for(&bytes);
        let now = Utc::now().to_rfc3339();

        let raw = {
            let conn = self.conn.lock();
            let inserted = conn.execute(
                "INSERT INTO records (namespace, key, value, embedding, created_at, updated_at, checksum)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)
                 ON CONFLICT(namespace, key) DO NOTHING",
                params![
                    namespace.storage_key(),
                    key,
                    bytes,
                    embedding.as_ref().map(encode_embedding),
                    now,
                    checksum
                ],
            )?;
            if inserted > 0 {
                debug!(namespace = %namespace, key, "initialised missing record");
            }
            self.load_one(&conn, namespace, key)?
        };

        let raw = raw.ok_or_else(|| MemoryError::Corrupt {
            namespace: namespace.to_string(),
            key: key.to_owned(),
            reason: "row vanished after insert".into(),
        })?;
        self.decode(namespace, raw)
    }

    fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Record>> {
        let raw = {
            let conn = self.conn.lock();
            self.load_one(&conn, namespace, key)?
        };
        raw.map(|raw| self.decode(namespace, raw)).transpose()
    }

    fn search(&self, namespace: &Namespace, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let Some(embedder) = self.embedder.as_deref() else {
            return Err(not_indexed(namespace));
        };
        let start = Instant::now();
        let query_embedding = embedder.embed(query)?;
        let candidates = self.load_namespace(namespace)?;
        let scanned = candidates.len();
        let hits = rank(&query_embedding, candidates, limit);
        debug!(
            namespace = %namespace,
            scanned,
            hits = hits.len(),
            elapsed_us = start.elapsed().as_micros(),
            "search"
        );
        Ok(hits)
    }

    fn list(&self, namespace: &Namespace) -> Result<Vec<Record>> {
        self.load_namespace(namespace)
    }

    fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool> {
        let deleted = self.conn.lock().execute(
            "DELETE FROM records WHERE namespace = ?1 AND key = ?2",
            params![namespace.storage_key(), key],
        )?;
        Ok(deleted > 0)
    }

    fn is_indexed(&self) -> bool {
        self.embedder.is_some()
    }
}

/// Adds `.optional()` to `rusqlite::Result`, turning `QueryReturnedNoRows`
/// into `Ok(None)`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
