//! Prompt Optimizer: rewrite procedural memory from user feedback.
//!
//! Three steps per call:
//!
//! 1. **Select** which registered prompts the feedback is about (one model
//!    call, conditioned on each prompt's `when_to_update`).
//! 2. **Rewrite** every selected prompt (one model call each). All rewrites
//!    finish before anything is written.
//! 3. **Commit** only the prompts whose text actually changed.
//!
//! A failed or unparsable model call in step 1 or 2 fails the whole call
//! with [`AgentError::Optimization`] and leaves every prompt untouched.

use std::time::Instant;

use mailmem_core::metrics::MailmemCounters;
use mailmem_core::procedural::{PromptDefinition, PromptState};
use mailmem_llm::prompt::{self, PromptId};
use mailmem_llm::types::{PromptRewriteResponse, PromptSelectionResponse};
use mailmem_llm::{parse_structured, Message, ResponseSchema};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use crate::context::AgentContext;
use crate::error::{AgentError, Result};
use crate::response::AGENT_INSTRUCTIONS;
use crate::trajectory::Trajectory;
use crate::triage::{IGNORE_RULE, NOTIFY_RULE, RESPOND_RULE};

/// Every prompt the optimizer may rewrite, in reporting order.
pub const REGISTERED_PROMPTS: [PromptDefinition; 4] =
    [AGENT_INSTRUCTIONS, IGNORE_RULE, NOTIFY_RULE, RESPOND_RULE];

/// Look up a registered prompt by name.
#[must_use]
pub fn registered_prompt(name: &str) -> Option<PromptDefinition> {
    REGISTERED_PROMPTS.into_iter().find(|p| p.name == name)
}

/// Applies feedback to procedural memory.
#[derive(Debug, Clone)]
pub struct PromptOptimizer {
    ctx: AgentContext,
    registry: Vec<PromptDefinition>,
}

impl PromptOptimizer {
    /// An optimizer over [`REGISTERED_PROMPTS`].
    #[must_use]
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            registry: REGISTERED_PROMPTS.to_vec(),
        }
    }

    /// Replace the set of prompts the optimizer may touch.
    #[must_use]
    pub fn with_registry(mut self, registry: Vec<PromptDefinition>) -> Self {
        self.registry = registry;
        self
    }

    /// Rewrite the prompts `feedback` is about and return the names that
    /// changed, in registry order.
    ///
    /// # Errors
    ///
    /// - [`AgentError::Optimization`] if a selection or rewrite call fails or
    ///   returns unusable output; nothing is written in that case.
    /// - [`AgentError::Memory`] if prompts cannot be read or written.
    #[instrument(skip(self, trajectory, feedback), fields(messages = trajectory.len()))]
    pub async fn apply_feedback(&self, tenant: &str, trajectory: &Trajectory, feedback: &str) -> Result<Vec<String>> {
        if !self.ctx.settings.learning {
            info!(tenant, "Learning disabled; feedback ignored");
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let counters = &self.ctx.counters;
        MailmemCounters::incr(&counters.optimizer_runs);

        let snapshot = self.ctx.procedural.snapshot(tenant, &self.registry)?;
        let transcript = trajectory.render();

        // Step 1: selection.
        let selected = self.select(&snapshot, &transcript, feedback).await?;
        debug!(tenant, selected = ?selected.iter().map(|s| s.name()).collect::<Vec<_>>(), "Prompts selected");

        // Step 2: every rewrite, before any write.
        let mut rewrites = Vec::with_capacity(selected.len());
        for state in selected {
            let text = self.rewrite(state, &transcript, feedback).await?;
            rewrites.push((state, text));
        }

        // Step 3: commit changed prompts only.
        let mut updated = Vec::new();
        for (state, text) in rewrites {
            if text == state.text {
                debug!(tenant, prompt = state.name(), "Rewrite left prompt unchanged");
                continue;
            }
            self.ctx.procedural.set(tenant, state.name(), &text)?;
            updated.push(state.name().to_owned());
        }

        MailmemCounters::add(&counters.optimizer_updates, updated.len() as u64);
        info!(
            tenant,
            updated = ?updated,
            elapsed_us = start.elapsed().as_micros(),
            "Feedback applied"
        );
        Ok(updated)
    }

    async fn select<'a>(
        &self,
        snapshot: &'a [PromptState],
        transcript: &str,
        feedback: &str,
    ) -> Result<Vec<&'a PromptState>> {
        let listing = snapshot
            .iter()
            .map(|s| {
                format!(
                    "- {}\n  When to update: {}\n  Current text: {}",
                    s.name(),
                    s.definition.when_to_update,
                    s.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let vars = [
            ("prompts", listing.as_str()),
            ("trajectory", transcript),
            ("feedback", feedback),
        ];
        let selection: PromptSelectionResponse = self
            .structured_call(PromptId::OptimizerSelect, &vars, prompt::prompt_selection_schema(), "selection")
            .await?;

        for name in &selection.prompt_names {
            if !snapshot.iter().any(|s| s.name() == name.as_str()) {
                warn!(prompt = %name, "Optimizer selected an unregistered prompt; ignoring");
            }
        }
        Ok(snapshot
            .iter()
            .filter(|s| selection.prompt_names.iter().any(|n| n.as_str() == s.name()))
            .collect())
    }

    async fn rewrite(&self, state: &PromptState, transcript: &str, feedback: &str) -> Result<String> {
        let vars = [
            ("prompt_name", state.name()),
            ("current_prompt", state.text.as_str()),
            ("when_to_update", state.definition.when_to_update),
            ("update_instructions", state.definition.update_instructions),
            ("trajectory", transcript),
            ("feedback", feedback),
        ];
        let reply: PromptRewriteResponse = self
            .structured_call(PromptId::OptimizerRewrite, &vars, prompt::prompt_rewrite_schema(), state.name())
            .await?;
        if reply.updated_prompt.trim().is_empty() {
            return Err(AgentError::Optimization(format!(
                "rewrite of '{}' returned an empty prompt",
                state.name()
            )));
        }
        Ok(reply.updated_prompt)
    }

    async fn structured_call<T: DeserializeOwned>(
        &self,
        id: PromptId,
        vars: &[(&str, &str)],
        schema: ResponseSchema,
        step: &str,
    ) -> Result<T> {
        let (system, user) = self
            .ctx
            .prompts
            .render(id, vars)
            .map_err(|e| AgentError::Config(e.to_string()))?;
        let request = self
            .ctx
            .request(id, vec![Message::system(system), Message::user(user)])
            .with_schema(schema);
        let reply = self
            .ctx
            .model
            .generate(&request)
            .await
            .map_err(|e| AgentError::Optimization(format!("{step} call failed: {e}")))?;
        parse_structured(&reply).map_err(|e| AgentError::Optimization(format!("{step} reply unusable: {e}")))
    }
}
