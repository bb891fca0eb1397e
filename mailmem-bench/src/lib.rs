//! Fixtures shared by the mailmem benchmarks.

use std::sync::Arc;

use mailmem_core::config::StoreConfig;
use mailmem_core::embedding::{EmbeddingProvider, HashingEmbeddingProvider};
use mailmem_core::{InMemoryStore, MemoryStore, SqliteStore};
use serde_json::{json, Value};

/// Embedding width used by every benchmark store.
pub const DIMENSIONS: usize = 256;

fn embedder() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbeddingProvider::new(DIMENSIONS).expect("non-zero dimensions"))
}

/// Both store backends, vector-indexed, keyed by a label for the report.
#[must_use]
pub fn stores() -> Vec<(&'static str, Arc<dyn MemoryStore>)> {
    let sqlite = SqliteStore::open_in_memory(&StoreConfig::default(), Some(embedder()))
        .expect("in-memory sqlite");
    vec![
        ("memory", Arc::new(InMemoryStore::indexed(embedder()))),
        ("sqlite", Arc::new(sqlite)),
    ]
}

const SENDERS: [&str; 5] = [
    "sarah.lee@company.com",
    "ci@company.com",
    "news@deals.example",
    "alice.smith@company.com",
    "recruiting@agency.example",
];

const SUBJECTS: [&str; 5] = [
    "Q3 slides for Friday",
    "Nightly build failed",
    "Weekend sale: 40% off",
    "Question about the API docs",
    "Exciting opportunity",
];

/// A synthetic email payload; `i` varies sender, subject and body.
#[must_use]
pub fn email(i: usize) -> Value {
    json!({
        "author": SENDERS[i % SENDERS.len()],
        "to": "john.doe@company.com",
        "subject": SUBJECTS[i % SUBJECTS.len()],
        "email_thread": format!(
            "Message {i}: {} Please take a look when you have a moment.",
            SUBJECTS[(i / 3) % SUBJECTS.len()]
        ),
    })
}

/// The triage label a fixture email would get.
#[must_use]
pub fn label(i: usize) -> &'static str {
    match i % SENDERS.len() {
        0 | 3 => "respond",
        1 => "notify",
        _ => "ignore",
    }
}
