//! # mailmem-agent
//!
//! The email assistant built on mailmem memory:
//!
//! ```text
//!             ┌──────────────┐  ignore / notify
//! email ─────▶│    triage    │─────────────────────▶ done
//!             └──────┬───────┘
//!                    │ respond (reasoning as context)
//!             ┌──────▼───────┐      tools       ┌───────────────┐
//!             │ response loop│◀────────────────▶│ episodic notes │
//!             └──────┬───────┘                  └───────────────┘
//!                    │ trajectory + user feedback
//!             ┌──────▼───────┐
//!             │  optimizer   │──▶ procedural memory (rules, instructions)
//!             └──────────────┘
//! ```
//!
//! Triage reads the three rule prompts from procedural memory and the most
//! similar labelled examples from semantic memory. The response loop reads
//! `agent_instructions`. The optimizer rewrites any of those four prompts,
//! so feedback on one email changes how the next one is handled.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assistant;
pub mod context;
pub mod email;
pub mod error;
pub mod optimizer;
pub mod response;
pub mod telemetry;
pub mod tools;
pub mod trajectory;
pub mod triage;

pub use assistant::{build_llm_client, EmailAssistant, ProcessOutcome};
pub use context::{AgentContext, AgentSettings};
pub use email::{Classification, EmailInput, TriageDecision};
pub use error::{AgentError, Result};
pub use optimizer::{PromptOptimizer, REGISTERED_PROMPTS};
pub use response::{ResponseAgent, AGENT_INSTRUCTIONS};
pub use tools::{Tool, ToolError, ToolRegistry};
pub use trajectory::Trajectory;
pub use triage::{TriageClassifier, IGNORE_RULE, NOTIFY_RULE, RESPOND_RULE};
