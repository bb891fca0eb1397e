//! Procedural memory: per-tenant prompt and rule text.
//!
//! Prompts live under the one-segment namespace `[tenant]`, keyed by prompt
//! name, with value `{"text": <prompt>}`. Consumers never touch the store
//! directly; they go through [`ProceduralMemory::resolve`] (or
//! [`ProceduralMemory::get_or_init`]), which fills in the default on first
//! use so a prompt is never observed missing.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, instrument};

use crate::error::{MemoryError, Result};
use crate::store::MemoryStore;
use crate::types::{Namespace, Record};

/// A registered prompt: its key, default text, and the guidance the optimizer
/// uses to decide when and how to rewrite it.
///
/// Declared as a `const` next to the component that reads the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptDefinition {
    /// Storage key.
    pub name: &'static str,
    /// Text stored the first time the prompt is requested for a tenant.
    pub default_text: &'static str,
    /// When feedback should cause this prompt to change.
    pub when_to_update: &'static str,
    /// Style guidance for rewrites.
    pub update_instructions: &'static str,
}

/// A prompt's definition together with the tenant's current text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptState {
    /// The registered definition.
    pub definition: PromptDefinition,
    /// Current stored text.
    pub text: String,
}

impl PromptState {
    /// Shorthand for `definition.name`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.definition.name
    }
}

/// Narrow API over the store for prompt text.
#[derive(Clone)]
pub struct ProceduralMemory {
    store: Arc<dyn MemoryStore>,
}

impl std::fmt::Debug for ProceduralMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProceduralMemory").finish_non_exhaustive()
    }
}

impl ProceduralMemory {
    /// Wrap a store.
    #[must_use]
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    /// Return the tenant's text for `name`, storing `default_text` first if
    /// the prompt has never been set.
    ///
    /// Idempotent: repeated calls for a missing prompt store exactly one
    /// record, and a concurrent [`ProceduralMemory::set`] is never
    /// overwritten by the default.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corrupt`] if the stored value has no string
    /// `text` field, or any store error.
    #[instrument(level = "debug", skip(self, default_text))]
    pub fn get_or_init(&self, tenant: &str, name: &str, default_text: &str) -> Result<String> {
        let ns = Namespace::procedural(tenant)?;
        let record = self
            .store
            .put_if_absent(&ns, name, json!({ "text": default_text }))?;
        prompt_text(record)
    }

    /// [`ProceduralMemory::get_or_init`] for a registered definition.
    ///
    /// # Errors
    ///
    /// See [`ProceduralMemory::get_or_init`].
    pub fn resolve(&self, tenant: &str, definition: &PromptDefinition) -> Result<String> {
        self.get_or_init(tenant, definition.name, definition.default_text)
    }

    /// Current text for `name`, without initialising it.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::Corrupt`] for a malformed record, or any store
    /// error.
    pub fn get(&self, tenant: &str, name: &str) -> Result<Option<String>> {
        let ns = Namespace::procedural(tenant)?;
        self.store.get(&ns, name)?.map(prompt_text).transpose()
    }

    /// Overwrite the tenant's text for `name`.
    ///
    /// # Errors
    ///
    /// Returns any store error.
    pub fn set(&self, tenant: &str, name: &str, text: &str) -> Result<()> {
        let ns = Namespace::procedural(tenant)?;
        self.store.put(&ns, name, json!({ "text": text }))?;
        debug!(tenant, name, chars = text.len(), "prompt updated");
        Ok(())
    }

    /// Read every registered prompt for a tenant, initialising missing ones.
    ///
    /// # Errors
    ///
    /// Fails on the first prompt that cannot be read.
    pub fn snapshot(&self, tenant: &str, definitions: &[PromptDefinition]) -> Result<Vec<PromptState>> {
        definitions
            .iter()
            .map(|definition| {
                Ok(PromptState {
                    definition: *definition,
                    text: self.resolve(tenant, definition)?,
                })
            })
            .collect()
    }
}

fn prompt_text(record: Record) -> Result<String> {
    match record.value.get("text").and_then(serde_json::Value::as_str) {
        Some(text) => Ok(text.to_owned()),
        None => Err(MemoryError::Corrupt {
            namespace: record.namespace.to_string(),
            key: record.key,
            reason: "prompt record has no string `text` field".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    const RULE: PromptDefinition = PromptDefinition {
        name: "ignore_rule",
        default_text: "Marketing newsletters",
        when_to_update: "When the ignore criteria change",
        update_instructions: "keep it short",
    };

    fn memory() -> (Arc<InMemoryStore>, ProceduralMemory) {
        let store = Arc::new(InMemoryStore::new());
        let dyn_store: Arc<dyn MemoryStore> = store.clone();
        (store, ProceduralMemory::new(dyn_store))
    }

    #[test]
    fn lazy_default_then_verbatim() {
        let (_, mem) = memory();
        assert_eq!(mem.get("t1", RULE.name).expect("get"), None);
        assert_eq!(mem.resolve("t1", &RULE).expect("resolve"), "Marketing newsletters");
        mem.set("t1", RULE.name, "Only spam").expect("set");
        assert_eq!(mem.resolve("t1", &RULE).expect("resolve"), "Only spam");
    }

    #[test]
    fn tenants_are_isolated() {
        let (_, mem) = memory();
        mem.set("t1", RULE.name, "custom").expect("set");
        assert_eq!(mem.resolve("t2", &RULE).expect("resolve"), RULE.default_text);
        assert_eq!(mem.get("t1", RULE.name).expect("get").as_deref(), Some("custom"));
    }

    #[test]
    fn record_without_text_is_corrupt() {
        let (store, mem) = memory();
        let ns = Namespace::procedural("t1").expect("ns");
        store.put(&ns, RULE.name, json!({"prompt": "legacy"})).expect("put");
        assert!(matches!(
            mem.resolve("t1", &RULE),
            Err(MemoryError::Corrupt { .. })
        ));
    }

    #[test]
    fn snapshot_initialises_all() {
        let (store, mem) = memory();
        const OTHER: PromptDefinition = PromptDefinition {
            name: "respond_rule",
            default_text: "Direct questions",
            when_to_update: "",
            update_instructions: "",
        };
        let states = mem.snapshot("t1", &[RULE, OTHER]).expect("snapshot");
        assert_eq!(states.len(), 2);
        assert_eq!(states[1].name(), "respond_rule");
        assert_eq!(states[1].text, "Direct questions");
        assert_eq!(store.len(&Namespace::procedural("t1").expect("ns")), 2);
    }

    #[test]
    fn empty_tenant_rejected() {
        let (_, mem) = memory();
        assert!(matches!(
            mem.resolve("", &RULE),
            Err(MemoryError::InvalidNamespace(_))
        ));
    }
}
