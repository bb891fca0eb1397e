//! # mailmem Core Library
//!
//! Long-term memory for an email assistant, built on one namespaced store.
//!
//! Every tenant gets three independent kinds of memory, each living in its
//! own namespace shape on top of the same [`MemoryStore`] contract:
//!
//! - **Procedural** — "How I should behave" (`[tenant]`): prompt and rule
//!   text that feedback rewrites over time.
//! - **Semantic** — "What I have seen before" (`[app, tenant, "examples"]`):
//!   labelled input examples used as few-shot guidance.
//! - **Episodic** — "What happened" (`[app, tenant, "episodes"]`): free-form
//!   notes the response agent stores and recalls on its own initiative.
//!
//! ## Store Contract
//!
//! - `put` replaces the whole value (last write wins) and re-derives the
//!   embedding when the store is indexed.
//! - `get` is exact lookup only.
//! - `search` ranks one namespace by cosine similarity and fails with
//!   [`MemoryError::NotIndexed`] on an unindexed store.
//! - No operation ever crosses a namespace boundary, prefixes included.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embedding;
pub mod episodic;
pub mod error;
pub mod metrics;
pub mod procedural;
pub mod semantic;
pub mod store;
pub mod types;

pub use config::MailmemConfig;
pub use embedding::EmbeddingProvider;
pub use error::MemoryError;
pub use store::{InMemoryStore, MemoryStore, SqliteStore};
pub use types::*;
