//! Tools offered to the response agent.
//!
//! Two kinds share one interface:
//!
//! - **Episodic memory tools** (`manage_memory`, `search_memory`) run
//!   locally against the tenant's episode namespace.
//! - **Action tools** (`write_email`, `schedule_meeting`,
//!   `check_calendar_availability`) stand in for external services; the loop
//!   treats them as opaque callables.
//!
//! A tool failure never aborts the loop. It becomes a tool-result message
//! with an `{"error": ...}` payload that the model can react to.

use std::sync::Arc;

use async_trait::async_trait;
use mailmem_core::episodic::EpisodicMemory;
use mailmem_core::MemoryError;
use mailmem_llm::{ToolCall, ToolSpec};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Why a tool invocation failed.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The model asked for a tool that is not registered.
    #[error("unknown tool '{0}'")]
    Unknown(String),
    /// Arguments did not match the tool's parameter schema.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// The tool ran and failed.
    #[error("{0}")]
    Failed(String),
    /// The memory store failed underneath an episodic tool.
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl ToolError {
    /// Tool-result payload handed back to the model.
    #[must_use]
    pub fn to_payload(&self) -> String {
        json!({ "error": self.to_string() }).to_string()
    }
}

/// A callable the model can request.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and JSON-schema parameters.
    fn spec(&self) -> ToolSpec;

    /// Run with the model-supplied arguments; the text result goes back to
    /// the model.
    async fn invoke(&self, args: Value) -> Result<String, ToolError>;
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered set of tools, unique by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ToolRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The three simulated action tools.
    #[must_use]
    pub fn with_default_actions() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(WriteEmailTool));
        registry.register(Arc::new(ScheduleMeetingTool));
        registry.register(Arc::new(CheckCalendarTool));
        registry
    }

    /// Add a tool. A tool with the same name is replaced in place.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        match self.tools.iter().position(|t| t.spec().name == name) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    /// Look a tool up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.spec().name == name)
    }

    /// Tool names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec().name).collect()
    }

    /// Specs in registration order, as sent with each model request.
    #[must_use]
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    /// Numbered list for the agent system prompt.
    #[must_use]
    pub fn describe(&self) -> String {
        self.tools
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let spec = t.spec();
                format!("{}. {} - {}", i + 1, spec.name, spec.description)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatch one model tool call.
    ///
    /// # Errors
    ///
    /// [`ToolError::Unknown`] for an unregistered name, otherwise whatever
    /// the tool returns.
    pub async fn invoke(&self, call: &ToolCall) -> Result<String, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::Unknown(call.name.clone()))?;
        tool.invoke(call.arguments.clone()).await
    }
}

// ---------------------------------------------------------------------------
// Episodic memory tools
// ---------------------------------------------------------------------------

/// `manage_memory`: store a note in the tenant's episodic memory.
#[derive(Clone)]
pub struct ManageMemoryTool {
    memory: EpisodicMemory,
    tenant: String,
}

impl ManageMemoryTool {
    /// Bind the tool to one tenant.
    #[must_use]
    pub fn new(memory: EpisodicMemory, tenant: impl Into<String>) -> Self {
        Self {
            memory,
            tenant: tenant.into(),
        }
    }
}

#[derive(Deserialize)]
struct ManageArgs {
    content: String,
    #[serde(default)]
    metadata: Value,
}

#[async_trait]
impl Tool for ManageMemoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "manage_memory".into(),
            description: "Store any relevant information about contacts, actions, discussion, etc. in memory for future reference".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "content": { "type": "string", "description": "The information to remember." },
                    "metadata": { "type": "object", "description": "Optional structured context, e.g. the contact involved." }
                },
                "required": ["content"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let args: ManageArgs = parse_args(args)?;
        if args.content.trim().is_empty() {
            return Err(ToolError::InvalidArguments("`content` must not be empty".into()));
        }
        let id = self.memory.remember(&self.tenant, &args.content, args.metadata)?;
        Ok(json!({ "status": "stored", "id": id }).to_string())
    }
}

/// `search_memory`: recall notes similar to a query.
#[derive(Clone)]
pub struct SearchMemoryTool {
    memory: EpisodicMemory,
    tenant: String,
    default_limit: usize,
}

impl SearchMemoryTool {
    /// Bind the tool to one tenant; `default_limit` applies when the model
    /// passes no `limit`.
    #[must_use]
    pub fn new(memory: EpisodicMemory, tenant: impl Into<String>, default_limit: usize) -> Self {
        Self {
            memory,
            tenant: tenant.into(),
            default_limit,
        }
    }
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_memory".into(),
            description: "Search for any relevant information that may have been stored in memory".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "What to look for." },
                    "limit": { "type": "integer", "minimum": 1, "description": "Maximum results." }
                },
                "required": ["query"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let args: SearchArgs = parse_args(args)?;
        let limit = args.limit.unwrap_or(self.default_limit);
        let episodes = self.memory.recall(&self.tenant, &args.query, limit)?;
        serde_json::to_string(&episodes).map_err(|e| ToolError::Failed(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Simulated action tools
// ---------------------------------------------------------------------------

/// `write_email`: pretends to send an email.
#[derive(Debug, Clone, Copy)]
pub struct WriteEmailTool;

#[derive(Deserialize)]
struct WriteEmailArgs {
    to: String,
    subject: String,
    #[allow(dead_code)]
    content: String,
}

#[async_trait]
impl Tool for WriteEmailTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write_email".into(),
            description: "Write and send an email.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "to": { "type": "string" },
                    "subject": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["to", "subject", "content"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let args: WriteEmailArgs = parse_args(args)?;
        Ok(format!("Email sent to {} with subject '{}'", args.to, args.subject))
    }
}

/// `schedule_meeting`: pretends to book a meeting.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleMeetingTool;

#[derive(Deserialize)]
struct ScheduleArgs {
    attendees: Vec<String>,
    subject: String,
    #[allow(dead_code)]
    duration_minutes: u32,
    preferred_day: String,
}

#[async_trait]
impl Tool for ScheduleMeetingTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "schedule_meeting".into(),
            description: "Schedule a calendar meeting.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "attendees": { "type": "array", "items": { "type": "string" } },
                    "subject": { "type": "string" },
                    "duration_minutes": { "type": "integer", "minimum": 1 },
                    "preferred_day": { "type": "string" }
                },
                "required": ["attendees", "subject", "duration_minutes", "preferred_day"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let args: ScheduleArgs = parse_args(args)?;
        Ok(format!(
            "Meeting '{}' scheduled for {} with {} attendees",
            args.subject,
            args.preferred_day,
            args.attendees.len()
        ))
    }
}

/// `check_calendar_availability`: reports fixed free slots.
#[derive(Debug, Clone, Copy)]
pub struct CheckCalendarTool;

#[derive(Deserialize)]
struct AvailabilityArgs {
    day: String,
}

#[async_trait]
impl Tool for CheckCalendarTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "check_calendar_availability".into(),
            description: "Check calendar availability for a given day.".into(),
            parameters: json!({
                "type": "object",
                "properties": { "day": { "type": "string" } },
                "required": ["day"]
            }),
        }
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        let args: AvailabilityArgs = parse_args(args)?;
        Ok(format!("Available times on {}: 9:00 AM, 2:00 PM, 4:00 PM", args.day))
    }
}

// ---------------------------------------------------------------------------
// Closure-backed tool
// ---------------------------------------------------------------------------

type ToolFn = dyn Fn(Value) -> Result<String, ToolError> + Send + Sync;

/// A tool implemented by a synchronous closure, for integrations and tests.
#[derive(Clone)]
pub struct FnTool {
    spec: ToolSpec,
    f: Arc<ToolFn>,
}

impl FnTool {
    /// Wrap `f` under `spec`.
    pub fn new<F>(spec: ToolSpec, f: F) -> Self
    where
        F: Fn(Value) -> Result<String, ToolError> + Send + Sync + 'static,
    {
        Self { spec, f: Arc::new(f) }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn invoke(&self, args: Value) -> Result<String, ToolError> {
        (self.f)(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailmem_core::embedding::HashingEmbeddingProvider;
    use mailmem_core::InMemoryStore;

    fn episodic() -> EpisodicMemory {
        let store = InMemoryStore::indexed(Arc::new(HashingEmbeddingProvider::new(128).expect("provider")));
        EpisodicMemory::new(Arc::new(store), "email_assistant")
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: "call_0".into(),
            name: name.into(),
            arguments,
        }
    }

    #[tokio::test]
    async fn memory_tools_store_and_recall_per_tenant() {
        let memory = episodic();
        let registry = ToolRegistry::new()
            .with(Arc::new(ManageMemoryTool::new(memory.clone(), "acme")))
            .with(Arc::new(SearchMemoryTool::new(memory.clone(), "acme", 5)));

        let stored = registry
            .invoke(&call("manage_memory", json!({"content": "Alice owns the auth service docs"})))
            .await
            .expect("store");
        assert!(stored.contains("\"stored\""));

        let found = registry
            .invoke(&call("search_memory", json!({"query": "auth service docs"})))
            .await
            .expect("search");
        let episodes: Vec<Value> = serde_json::from_str(&found).expect("json");
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0]["content"], "Alice owns the auth service docs");

        assert!(memory.recall("other", "auth", 5).expect("recall").is_empty());
    }

    #[tokio::test]
    async fn action_tools_answer_like_their_services() {
        let registry = ToolRegistry::with_default_actions();
        assert_eq!(
            registry.names(),
            ["write_email", "schedule_meeting", "check_calendar_availability"]
        );
        let sent = registry
            .invoke(&call("write_email", json!({"to": "alice", "subject": "Docs", "content": "Fixed."})))
            .await
            .expect("write");
        assert_eq!(sent, "Email sent to alice with subject 'Docs'");

        let booked = registry
            .invoke(&call(
                "schedule_meeting",
                json!({"attendees": ["a", "b"], "subject": "Sync", "duration_minutes": 30, "preferred_day": "Tuesday"}),
            ))
            .await
            .expect("schedule");
        assert_eq!(booked, "Meeting 'Sync' scheduled for Tuesday with 2 attendees");
    }

    #[tokio::test]
    async fn bad_arguments_and_unknown_tools_are_errors() {
        let registry = ToolRegistry::with_default_actions();
        let err = registry
            .invoke(&call("write_email", json!({"to": "alice"})))
            .await
            .expect_err("missing fields");
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let err = registry.invoke(&call("fly", json!({}))).await.expect_err("unknown");
        assert_eq!(err.to_payload(), r#"{"error":"unknown tool 'fly'"}"#);
    }

    #[test]
    fn register_replaces_by_name_and_describe_numbers() {
        let mut registry = ToolRegistry::with_default_actions();
        registry.register(Arc::new(FnTool::new(
            ToolSpec {
                name: "write_email".into(),
                description: "Draft only.".into(),
                parameters: json!({"type": "object"}),
            },
            |_| Ok("drafted".into()),
        )));
        assert_eq!(registry.len(), 3);
        assert!(registry.describe().starts_with("1. write_email - Draft only.\n2. schedule_meeting"));
    }
}
