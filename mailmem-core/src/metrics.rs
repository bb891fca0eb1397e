//! Runtime counters.
//!
//! Lock-free `AtomicU64` counters incremented on the hot path and read on
//! export. [`CountedStore`] wraps any [`MemoryStore`] to count its writes
//! and searches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::store::MemoryStore;
use crate::types::{Namespace, Record, SearchHit};

/// Atomic counters for high-frequency events.
#[derive(Debug)]
pub struct MailmemCounters {
    /// Messages classified `ignore`.
    pub classified_ignore: AtomicU64,
    /// Messages classified `notify`.
    pub classified_notify: AtomicU64,
    /// Messages classified `respond`.
    pub classified_respond: AtomicU64,
    /// Triage attempts that returned an invalid structured result.
    pub classification_retries: AtomicU64,
    /// Triage calls that failed after the retry.
    pub classification_failures: AtomicU64,
    /// Tool invocations made by the response loop.
    pub tool_calls: AtomicU64,
    /// Tool invocations that produced an error payload.
    pub tool_errors: AtomicU64,
    /// Response loops stopped by the iteration cap.
    pub loop_overruns: AtomicU64,
    /// `apply_feedback` invocations.
    pub optimizer_runs: AtomicU64,
    /// Prompts rewritten by the optimizer.
    pub optimizer_updates: AtomicU64,
    /// Store writes (`put`, `put_if_absent`).
    pub store_puts: AtomicU64,
    /// Store vector searches.
    pub store_searches: AtomicU64,
}

impl MailmemCounters {
    /// Create a new set of zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            classified_ignore: AtomicU64::new(0),
            classified_notify: AtomicU64::new(0),
            classified_respond: AtomicU64::new(0),
            classification_retries: AtomicU64::new(0),
            classification_failures: AtomicU64::new(0),
            tool_calls: AtomicU64::new(0),
            tool_errors: AtomicU64::new(0),
            loop_overruns: AtomicU64::new(0),
            optimizer_runs: AtomicU64::new(0),
            optimizer_updates: AtomicU64::new(0),
            store_puts: AtomicU64::new(0),
            store_searches: AtomicU64::new(0),
        }
    }

    /// Add one to a counter.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Snapshot all counters for export.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            classified: [
                self.classified_ignore.load(Ordering::Relaxed),
                self.classified_notify.load(Ordering::Relaxed),
                self.classified_respond.load(Ordering::Relaxed),
            ],
            classification_retries: self.classification_retries.load(Ordering::Relaxed),
            classification_failures: self.classification_failures.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            tool_errors: self.tool_errors.load(Ordering::Relaxed),
            loop_overruns: self.loop_overruns.load(Ordering::Relaxed),
            optimizer_runs: self.optimizer_runs.load(Ordering::Relaxed),
            optimizer_updates: self.optimizer_updates.load(Ordering::Relaxed),
            store_puts: self.store_puts.load(Ordering::Relaxed),
            store_searches: self.store_searches.load(Ordering::Relaxed),
        }
    }
}

impl Default for MailmemCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// A snapshot of counter values at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Classifications by class `[ignore, notify, respond]`.
    pub classified: [u64; 3],
    /// Triage retries.
    pub classification_retries: u64,
    /// Triage failures.
    pub classification_failures: u64,
    /// Tool invocations.
    pub tool_calls: u64,
    /// Tool errors.
    pub tool_errors: u64,
    /// Loop overruns.
    pub loop_overruns: u64,
    /// Optimizer runs.
    pub optimizer_runs: u64,
    /// Prompts rewritten.
    pub optimizer_updates: u64,
    /// Store writes.
    pub store_puts: u64,
    /// Store searches.
    pub store_searches: u64,
}

impl CounterSnapshot {
    /// Format as Prometheus-compatible text.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::from(
            "# HELP mailmem_classified_total Messages classified by triage\n\
             # TYPE mailmem_classified_total counter\n",
        );
        for (label, value) in ["ignore", "notify", "respond"].iter().zip(self.classified) {
            out.push_str(&format!("mailmem_classified_total{{class=\"{label}\"}} {value}\n"));
        }
        let simple = [
            ("classification_retries_total", "Triage retries after invalid output", self.classification_retries),
            ("classification_failures_total", "Triage failures after retry", self.classification_failures),
            ("tool_calls_total", "Tool invocations", self.tool_calls),
            ("tool_errors_total", "Tool invocations returning an error", self.tool_errors),
            ("loop_overruns_total", "Response loops hitting the iteration cap", self.loop_overruns),
            ("optimizer_runs_total", "Feedback optimizer runs", self.optimizer_runs),
            ("optimizer_updates_total", "Prompts rewritten by the optimizer", self.optimizer_updates),
            ("store_puts_total", "Memory store writes", self.store_puts),
            ("store_searches_total", "Memory store vector searches", self.store_searches),
        ];
        for (name, help, value) in simple {
            out.push_str(&format!(
                "# HELP mailmem_{name} {help}\n# TYPE mailmem_{name} counter\nmailmem_{name} {value}\n"
            ));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Store instrumentation
// ---------------------------------------------------------------------------

/// A [`MemoryStore`] decorator that counts writes and searches.
pub struct CountedStore<S> {
    inner: S,
    counters: Arc<MailmemCounters>,
}

impl<S> CountedStore<S> {
    /// Wrap `inner`, incrementing `counters` on every write and search.
    pub fn new(inner: S, counters: Arc<MailmemCounters>) -> Self {
        Self { inner, counters }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: MemoryStore> MemoryStore for CountedStore<S> {
    fn put_with_text(
        &self,
        namespace: &Namespace,
        key: &str,
        value: Value,
        index_text: Option<&str>,
    ) -> Result<()> {
        MailmemCounters::incr(&self.counters.store_puts);
        self.inner.put_with_text(namespace, key, value, index_text)
    }

    fn put_if_absent(&self, namespace: &Namespace, key: &str, value: Value) -> Result<Record> {
        MailmemCounters::incr(&self.counters.store_puts);
        self.inner.put_if_absent(namespace, key, value)
    }

    fn get(&self, namespace: &Namespace, key: &str) -> Result<Option<Record>> {
        self.inner.get(namespace, key)
    }

    fn search(&self, namespace: &Namespace, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        MailmemCounters::incr(&self.counters.store_searches);
        self.inner.search(namespace, query, limit)
    }

    fn list(&self, namespace: &Namespace) -> Result<Vec<Record>> {
        self.inner.list(namespace)
    }

    fn delete(&self, namespace: &Namespace, key: &str) -> Result<bool> {
        self.inner.delete(namespace, key)
    }

    fn is_indexed(&self) -> bool {
        self.inner.is_indexed()
    }
}
