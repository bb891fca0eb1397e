//! Response Agent Loop.
//!
//! A bounded generate → tool call → generate cycle:
//!
//! ```text
//! [system, user] ──generate──▶ assistant(tool_calls?) ──none──▶ done
//!                    ▲                  │
//!                    └── tool results ◀─┘   (at most max_iterations calls)
//! ```
//!
//! Messages go straight into the caller's [`Trajectory`], so a run that
//! times out, fails or is dropped mid-await leaves every message produced so
//! far in place.

use std::sync::Arc;
use std::time::{Duration, Instant};

use mailmem_core::metrics::MailmemCounters;
use mailmem_core::procedural::PromptDefinition;
use mailmem_llm::prompt::PromptId;
use mailmem_llm::{LlmError, Message};
use tracing::{debug, info, instrument, warn};

use crate::context::AgentContext;
use crate::email::EmailInput;
use crate::error::{AgentError, Result};
use crate::tools::{ManageMemoryTool, SearchMemoryTool, ToolRegistry};
use crate::trajectory::Trajectory;

/// How the agent writes emails and uses its tools.
pub const AGENT_INSTRUCTIONS: PromptDefinition = PromptDefinition {
    name: "agent_instructions",
    default_text: "Use these tools when appropriate to help manage John's tasks efficiently.",
    when_to_update: "Update this prompt whenever there is feedback on how the agent should write emails or schedule events",
    update_instructions: "keep the instructions short and to the point",
};

/// Drafts replies with tools and episodic memory.
#[derive(Debug, Clone)]
pub struct ResponseAgent {
    ctx: AgentContext,
    actions: ToolRegistry,
}

impl ResponseAgent {
    /// An agent with the three simulated action tools.
    #[must_use]
    pub fn new(ctx: AgentContext) -> Self {
        Self {
            ctx,
            actions: ToolRegistry::with_default_actions(),
        }
    }

    /// Replace the action tools (the memory tools are always added).
    #[must_use]
    pub fn with_actions(mut self, actions: ToolRegistry) -> Self {
        self.actions = actions;
        self
    }

    /// Action tools plus the episodic memory tools bound to `tenant`.
    #[must_use]
    pub fn tools_for(&self, tenant: &str) -> ToolRegistry {
        let episodic = &self.ctx.episodic;
        self.actions
            .clone()
            .with(Arc::new(ManageMemoryTool::new(episodic.clone(), tenant)))
            .with(Arc::new(SearchMemoryTool::new(
                episodic.clone(),
                tenant,
                self.ctx.settings.recall_limit,
            )))
    }

    /// The system instruction for `tenant`, built from the current
    /// `agent_instructions` text.
    ///
    /// # Errors
    ///
    /// Fails if procedural memory cannot be read.
    pub fn system_prompt(&self, tenant: &str, tools: &ToolRegistry) -> Result<String> {
        let instructions = self.ctx.procedural.resolve(tenant, &AGENT_INSTRUCTIONS)?;
        let tool_list = tools.describe();
        let mut vars = self.ctx.profile_vars().to_vec();
        vars.extend([("tools", tool_list.as_str()), ("instructions", instructions.as_str())]);
        let (system, _) = self
            .ctx
            .prompts
            .render(PromptId::Agent, &vars)
            .map_err(|e| AgentError::Config(e.to_string()))?;
        Ok(system)
    }

    /// Draft a response to `email`. `context` is the triage reasoning.
    ///
    /// # Errors
    ///
    /// - [`AgentError::LoopExceeded`] when the model keeps calling tools past
    ///   `max_iterations`; the partial trajectory is attached.
    /// - [`AgentError::Llm`] when a model call fails or times out; the
    ///   partial trajectory is attached. Model calls are not retried.
    #[instrument(skip(self, email, context), fields(subject = %email.subject))]
    pub async fn respond(&self, tenant: &str, email: &EmailInput, context: &str) -> Result<Trajectory> {
        let tools = self.tools_for(tenant);
        let system = self.system_prompt(tenant, &tools)?;
        let email_text = email.to_string();
        let (_, user) = self
            .ctx
            .prompts
            .render(PromptId::Agent, &[("email", email_text.as_str()), ("context", context)])
            .map_err(|e| AgentError::Config(e.to_string()))?;

        let mut trajectory = Trajectory::new();
        trajectory.push(Message::system(system));
        trajectory.push(Message::user(user));
        self.run(tenant, &mut trajectory, &tools).await?;
        Ok(trajectory)
    }

    /// Continue the conversation in `trajectory` until the model answers
    /// without tool calls.
    ///
    /// Every model reply and tool result is appended before the next await.
    ///
    /// # Errors
    ///
    /// Same as [`respond`](Self::respond); the attached trajectory is a copy
    /// of `trajectory` at the failure point.
    pub async fn run(&self, tenant: &str, trajectory: &mut Trajectory, tools: &ToolRegistry) -> Result<()> {
        let start = Instant::now();
        let counters = &self.ctx.counters;
        let max_iterations = self.ctx.settings.max_iterations;
        let call_timeout = self.ctx.settings.call_timeout_ms;
        let specs = tools.specs();

        for iteration in 1..=max_iterations {
            let request = self
                .ctx
                .request(PromptId::Agent, trajectory.messages().to_vec())
                .with_tools(specs.clone());

            let outcome = tokio::time::timeout(
                Duration::from_millis(call_timeout),
                self.ctx.model.generate(&request),
            )
            .await;
            let reply = match outcome {
                Ok(Ok(reply)) => reply,
                Ok(Err(source)) => return Err(llm_failure(source, trajectory)),
                Err(_) => {
                    warn!(tenant, iteration, call_timeout, "Model call timed out");
                    return Err(llm_failure(LlmError::Timeout(call_timeout), trajectory));
                }
            };

            let calls = reply.tool_calls.clone();
            trajectory.push(reply);
            if calls.is_empty() {
                info!(
                    tenant,
                    iterations = iteration,
                    messages = trajectory.len(),
                    elapsed_us = start.elapsed().as_micros(),
                    "Response complete"
                );
                return Ok(());
            }

            for call in &calls {
                MailmemCounters::incr(&counters.tool_calls);
                let content = match tools.invoke(call).await {
                    Ok(content) => {
                        debug!(tenant, tool = %call.name, "Tool call succeeded");
                        content
                    }
                    Err(e) => {
                        MailmemCounters::incr(&counters.tool_errors);
                        warn!(tenant, tool = %call.name, error = %e, "Tool call failed");
                        e.to_payload()
                    }
                };
                trajectory.push(Message::tool_result(call, content));
            }
        }

        MailmemCounters::incr(&counters.loop_overruns);
        warn!(tenant, max_iterations, "Response loop exceeded its iteration cap");
        Err(AgentError::LoopExceeded {
            iterations: max_iterations,
            trajectory: trajectory.clone(),
        })
    }
}

fn llm_failure(source: LlmError, trajectory: &Trajectory) -> AgentError {
    AgentError::Llm {
        source,
        trajectory: Some(trajectory.clone()),
    }
}
