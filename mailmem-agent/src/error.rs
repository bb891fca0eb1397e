//! Errors surfaced by the triage, response and optimizer entry points.

use mailmem_core::MemoryError;
use mailmem_llm::LlmError;
use thiserror::Error;

use crate::trajectory::Trajectory;

/// Top-level error for the agent pipeline.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The memory store failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// A model call failed at the transport level or timed out.
    ///
    /// Inside the response loop the messages accumulated before the failure
    /// are kept in `trajectory`.
    #[error("model call failed: {source}")]
    Llm {
        /// Underlying model error.
        #[source]
        source: LlmError,
        /// Partial conversation, when the failure happened mid-loop.
        trajectory: Option<Trajectory>,
    },

    /// The triage reply stayed invalid after the corrective retry.
    #[error("classification failed after {attempts} attempts: {reason}")]
    Classification {
        /// Model calls made.
        attempts: u32,
        /// Why the last reply was rejected.
        reason: String,
    },

    /// The response loop hit its model-call cap without a final answer.
    #[error("response loop exceeded {iterations} model calls")]
    LoopExceeded {
        /// The cap that was reached.
        iterations: usize,
        /// Everything generated up to the cap.
        trajectory: Trajectory,
    },

    /// A prompt optimizer call failed; no prompt was changed.
    #[error("prompt optimization failed: {0}")]
    Optimization(String),

    /// The pipeline could not be built from configuration.
    #[error("invalid agent configuration: {0}")]
    Config(String),
}

impl From<LlmError> for AgentError {
    fn from(source: LlmError) -> Self {
        Self::Llm {
            source,
            trajectory: None,
        }
    }
}

impl AgentError {
    /// The partial trajectory carried by loop failures, if any.
    #[must_use]
    pub fn trajectory(&self) -> Option<&Trajectory> {
        match self {
            Self::Llm { trajectory, .. } => trajectory.as_ref(),
            Self::LoopExceeded { trajectory, .. } => Some(trajectory),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AgentError>;
