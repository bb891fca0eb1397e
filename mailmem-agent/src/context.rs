//! Shared dependencies of the triage, response and optimizer stages.

use std::sync::Arc;

use mailmem_core::config::{MailmemConfig, ProfileConfig};
use mailmem_core::episodic::EpisodicMemory;
use mailmem_core::metrics::MailmemCounters;
use mailmem_core::procedural::ProceduralMemory;
use mailmem_core::semantic::SemanticMemory;
use mailmem_core::MemoryStore;
use mailmem_llm::prompt::{PromptEngine, PromptId};
use mailmem_llm::{LanguageModel, LlmRequest, Message};

/// Numeric knobs of the agent stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentSettings {
    /// Few-shot examples pulled into a triage prompt.
    pub few_shot_limit: usize,
    /// Default `limit` of the `search_memory` tool.
    pub recall_limit: usize,
    /// Model calls allowed per response loop.
    pub max_iterations: usize,
    /// Deadline of one response-loop model call.
    pub call_timeout_ms: u64,
    /// HTTP timeout passed with every request.
    pub request_timeout_ms: u64,
    /// Sampling temperature.
    pub temperature: f32,
    /// Whether the optimizer may write prompts.
    pub learning: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&MailmemConfig::default())
    }
}

impl AgentSettings {
    /// Pull the agent knobs out of a full configuration.
    #[must_use]
    pub fn from_config(config: &MailmemConfig) -> Self {
        Self {
            few_shot_limit: config.retrieval.few_shot_limit,
            recall_limit: config.retrieval.recall_limit,
            max_iterations: config.agent.max_iterations,
            call_timeout_ms: config.agent.call_timeout_ms,
            request_timeout_ms: config.llm.request_timeout_ms,
            temperature: config.llm.temperature,
            learning: config.general.learning,
        }
    }
}

/// Everything a stage needs: memory views, the model, templates and counters.
///
/// Cloning is cheap; all heavy parts are behind `Arc`.
#[derive(Clone)]
pub struct AgentContext {
    /// Prompt and rule text.
    pub procedural: ProceduralMemory,
    /// Few-shot triage examples.
    pub semantic: SemanticMemory,
    /// Agent-managed notes.
    pub episodic: EpisodicMemory,
    /// The language model behind every stage.
    pub model: Arc<dyn LanguageModel>,
    /// Prompt templates.
    pub prompts: Arc<PromptEngine>,
    /// Inbox owner.
    pub profile: ProfileConfig,
    /// Limits and timeouts.
    pub settings: AgentSettings,
    /// Operational counters.
    pub counters: Arc<MailmemCounters>,
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("model", &self.model.model_name())
            .field("profile", &self.profile)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl AgentContext {
    /// A context over `store` with the default app name, profile and limits.
    #[must_use]
    pub fn new(store: Arc<dyn MemoryStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self::with_app(store, model, &MailmemConfig::default().agent.app_name)
    }

    fn with_app(store: Arc<dyn MemoryStore>, model: Arc<dyn LanguageModel>, app: &str) -> Self {
        Self {
            procedural: ProceduralMemory::new(Arc::clone(&store)),
            semantic: SemanticMemory::new(Arc::clone(&store), app),
            episodic: EpisodicMemory::new(store, app),
            model,
            prompts: Arc::new(PromptEngine::builtin()),
            profile: ProfileConfig::default(),
            settings: AgentSettings::default(),
            counters: Arc::new(MailmemCounters::new()),
        }
    }

    /// A context configured from `config`, with the given templates.
    #[must_use]
    pub fn from_config(
        config: &MailmemConfig,
        store: Arc<dyn MemoryStore>,
        model: Arc<dyn LanguageModel>,
        prompts: PromptEngine,
    ) -> Self {
        Self {
            prompts: Arc::new(prompts),
            profile: config.agent.profile.clone(),
            settings: AgentSettings::from_config(config),
            ..Self::with_app(store, model, &config.agent.app_name)
        }
    }

    /// Replace the profile.
    #[must_use]
    pub fn with_profile(mut self, profile: ProfileConfig) -> Self {
        self.profile = profile;
        self
    }

    /// Replace the limits.
    #[must_use]
    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Share an existing counter set.
    #[must_use]
    pub fn with_counters(mut self, counters: Arc<MailmemCounters>) -> Self {
        self.counters = counters;
        self
    }

    /// The profile placeholders shared by triage and agent templates.
    pub(crate) fn profile_vars(&self) -> [(&str, &str); 3] {
        [
            ("name", self.profile.name.as_str()),
            ("full_name", self.profile.full_name.as_str()),
            ("user_profile_background", self.profile.background.as_str()),
        ]
    }

    /// A request carrying the template's token limit and the configured
    /// temperature and timeout.
    pub(crate) fn request(&self, id: PromptId, messages: Vec<Message>) -> LlmRequest {
        let max_tokens = self.prompts.get(id).map_or(1024, |t| t.max_tokens);
        LlmRequest::new(messages)
            .with_max_tokens(max_tokens)
            .with_temperature(self.settings.temperature)
            .with_timeout(self.settings.request_timeout_ms)
    }
}
