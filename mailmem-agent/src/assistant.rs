//! The assembled assistant: triage, then respond, plus the feedback path.

use std::sync::Arc;

use mailmem_core::config::{LlmConfig, MailmemConfig};
use mailmem_core::metrics::MailmemCounters;
use mailmem_core::procedural::PromptState;
use mailmem_core::store::build_store;
use mailmem_llm::prompt::PromptEngine;
use mailmem_llm::{LlmClient, LlmProvider};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::context::AgentContext;
use crate::email::{Classification, EmailInput, TriageDecision};
use crate::error::{AgentError, Result};
use crate::optimizer::{PromptOptimizer, REGISTERED_PROMPTS};
use crate::response::ResponseAgent;
use crate::tools::ToolRegistry;
use crate::trajectory::Trajectory;
use crate::triage::TriageClassifier;

/// Build the HTTP model client described by `config`.
///
/// # Errors
///
/// Returns [`AgentError::Config`] for an unknown provider, or when the
/// `openai` provider's API key variable is unset.
pub fn build_llm_client(config: &LlmConfig) -> Result<LlmClient> {
    let provider = match config.provider.as_str() {
        "ollama" => LlmProvider::Ollama {
            base_url: config.base_url.clone(),
        },
        "openai" => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                AgentError::Config(format!("environment variable {} is not set", config.api_key_env))
            })?;
            LlmProvider::OpenAiCompatible {
                base_url: config.base_url.clone(),
                api_key,
            }
        }
        "none" => LlmProvider::None,
        other => {
            return Err(AgentError::Config(format!(
                "unknown llm provider '{other}' (expected ollama, openai or none)"
            )));
        }
    };
    Ok(LlmClient::new(provider, config.model.clone()).with_max_retries(config.max_retries))
}

/// Result of [`EmailAssistant::process`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    /// The triage decision.
    pub decision: TriageDecision,
    /// The response conversation; present only for `respond`.
    pub trajectory: Option<Trajectory>,
}

/// Triage, response and optimizer over one shared context.
#[derive(Debug, Clone)]
pub struct EmailAssistant {
    ctx: AgentContext,
    triage: TriageClassifier,
    responder: ResponseAgent,
    optimizer: PromptOptimizer,
}

impl EmailAssistant {
    /// Wire the three stages to `ctx`.
    #[must_use]
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            triage: TriageClassifier::new(ctx.clone()),
            responder: ResponseAgent::new(ctx.clone()),
            optimizer: PromptOptimizer::new(ctx.clone()),
            ctx,
        }
    }

    /// Build store, model client and templates from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be opened, the provider is misconfigured, or
    /// `llm.prompt_dir` cannot be loaded.
    pub fn from_config(config: &MailmemConfig) -> Result<Self> {
        let store = build_store(&config.store, &config.embedding)?;
        let client = build_llm_client(&config.llm)?;
        let prompts = match &config.llm.prompt_dir {
            Some(dir) => PromptEngine::from_directory(dir).map_err(|e| AgentError::Config(e.to_string()))?,
            None => PromptEngine::builtin(),
        };
        info!(
            backend = %config.store.backend,
            provider = %config.llm.provider,
            model = %config.llm.model,
            "Email assistant configured"
        );
        Ok(Self::new(AgentContext::from_config(config, store, Arc::new(client), prompts)))
    }

    /// Replace the response agent's action tools.
    #[must_use]
    pub fn with_actions(mut self, actions: ToolRegistry) -> Self {
        self.responder = self.responder.with_actions(actions);
        self
    }

    /// The shared context.
    #[must_use]
    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    /// Operational counters.
    #[must_use]
    pub fn counters(&self) -> &Arc<MailmemCounters> {
        &self.ctx.counters
    }

    /// The response agent, for callers that drive the loop themselves.
    #[must_use]
    pub fn responder(&self) -> &ResponseAgent {
        &self.responder
    }

    /// Classify `email`; draft a response when the class is `respond`.
    ///
    /// # Errors
    ///
    /// Any error of [`TriageClassifier::classify`] or
    /// [`ResponseAgent::respond`].
    #[instrument(skip(self, email), fields(subject = %email.subject))]
    pub async fn process(&self, tenant: &str, email: &EmailInput) -> Result<ProcessOutcome> {
        let decision = self.triage.classify(tenant, email).await?;
        let trajectory = match decision.classification {
            Classification::Respond => Some(self.responder.respond(tenant, email, &decision.reasoning).await?),
            Classification::Ignore | Classification::Notify => None,
        };
        Ok(ProcessOutcome { decision, trajectory })
    }

    /// Classify without responding.
    ///
    /// # Errors
    ///
    /// See [`TriageClassifier::classify`].
    pub async fn classify(&self, tenant: &str, email: &EmailInput) -> Result<TriageDecision> {
        self.triage.classify(tenant, email).await
    }

    /// Store a labelled example for future triage prompts.
    ///
    /// # Errors
    ///
    /// Fails if the store rejects the write.
    pub fn add_example(
        &self,
        tenant: &str,
        example_id: &str,
        email: &EmailInput,
        label: Classification,
    ) -> Result<()> {
        self.ctx
            .semantic
            .add_example(tenant, example_id, &email.as_payload(), label.as_str())?;
        Ok(())
    }

    /// Rewrite prompts from feedback on `trajectory`.
    ///
    /// # Errors
    ///
    /// See [`PromptOptimizer::apply_feedback`].
    pub async fn apply_feedback(&self, tenant: &str, trajectory: &Trajectory, feedback: &str) -> Result<Vec<String>> {
        self.optimizer.apply_feedback(tenant, trajectory, feedback).await
    }

    /// Current text of every optimizable prompt for `tenant`.
    ///
    /// # Errors
    ///
    /// Fails if procedural memory cannot be read.
    pub fn prompts(&self, tenant: &str) -> Result<Vec<PromptState>> {
        Ok(self.ctx.procedural.snapshot(tenant, &REGISTERED_PROMPTS)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_selection() {
        let mut config = LlmConfig::default();
        assert!(build_llm_client(&config).is_ok());

        config.provider = "none".into();
        let client = build_llm_client(&config).expect("none");
        assert!(!client.is_available());

        config.provider = "bedrock".into();
        assert!(matches!(build_llm_client(&config), Err(AgentError::Config(_))));

        config.provider = "openai".into();
        config.api_key_env = "MAILMEM_TEST_KEY_THAT_IS_NEVER_SET".into();
        assert!(matches!(build_llm_client(&config), Err(AgentError::Config(_))));
    }
}
