//! # mailmem-llm: Language-Model Boundary for mailmem
//!
//! Provides a unified chat interface across multiple backends:
//!   - **Ollama** (local, recommended default)
//!   - **OpenAI-compatible API** (also works with vLLM, Together, etc.)
//!   - **Scripted** replies for tests and offline runs
//!
//! All LLM calls in mailmem go through this crate, ensuring:
//!   - Structured output enforcement (JSON schema)
//!   - Tool-calling in both wire dialects
//!   - Timeout management
//!   - Opt-in transport retries
//!
//! # Call sites
//!
//! ```text
//! Triage router      schema {reasoning, classification}   1 call (+1 corrective retry)
//! Response agent     tools, free text                     up to max_iterations calls
//! Prompt optimizer   schema {prompt_names}, {updated_prompt}  1 + one per selected prompt
//! ```

pub mod client;
pub mod error;
pub mod mock;
pub mod prompt;
pub mod types;

pub use client::{parse_structured, LanguageModel, LlmClient, LlmProvider};
pub use error::LlmError;
pub use mock::ScriptedModel;
pub use types::{LlmRequest, Message, ResponseSchema, Role, ToolCall, ToolSpec};
