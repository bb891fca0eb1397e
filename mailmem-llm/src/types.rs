//! Message, tool and request types shared by every model backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the conversation.
    System,
    /// The human side (or the pipeline acting for it).
    User,
    /// The model.
    Assistant,
    /// Output of a tool the model called.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Id correlating the call with its result message.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: Value,
}

/// One entry of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author.
    pub role: Role,
    /// Text content (may be empty for a pure tool-call message).
    pub content: String,
    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool messages: the call being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool messages: the tool that produced the content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// A plain assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// An assistant message requesting tool calls.
    #[must_use]
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// The result of executing `call`.
    #[must_use]
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// Whether the model asked for at least one tool call.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// A callable tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Name the model uses to call it.
    pub name: String,
    /// When and why to use it.
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: Value,
}

/// A named JSON Schema the model's reply must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Schema name (reported in validation errors).
    pub name: String,
    /// The schema itself.
    pub schema: Value,
}

/// A request to a [`crate::LanguageModel`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmRequest {
    /// Full conversation so far, system message first.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    pub tools: Vec<ToolSpec>,
    /// Structured output constraint, if any.
    pub response_schema: Option<ResponseSchema>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// HTTP deadline in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// A request over `messages` with no tools and no schema.
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            response_schema: None,
            max_tokens: 1024,
            temperature: 0.0,
            timeout_ms: 30_000,
        }
    }

    /// Offer tools to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    /// Constrain the reply to a JSON schema.
    #[must_use]
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Set the token limit.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// The system message, if the conversation starts with one.
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .first()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }
}

// ---------------------------------------------------------------------------
// Structured outputs
// ---------------------------------------------------------------------------

/// Raw triage reply. The classification is still an unvalidated string here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResponse {
    /// Step-by-step reasoning.
    #[serde(default)]
    pub reasoning: String,
    /// One of `ignore`, `notify`, `respond` if the model behaved.
    #[serde(default)]
    pub classification: String,
}

/// Optimizer step 1 reply: which prompts to rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSelectionResponse {
    /// Prompt names, possibly including names that are not registered.
    pub prompt_names: Vec<String>,
}

/// Optimizer step 2 reply: the replacement text for one prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRewriteResponse {
    /// Full new prompt text.
    pub updated_prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_result_links_call() {
        let call = ToolCall {
            id: "call_1".into(),
            name: "search_memory".into(),
            arguments: json!({"query": "alice"}),
        };
        let msg = Message::tool_result(&call, "[]");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("search_memory"));
    }

    #[test]
    fn message_serde_skips_empty_fields() {
        let text = serde_json::to_string(&Message::user("hi")).expect("serialize");
        assert_eq!(text, r#"{"role":"user","content":"hi"}"#);
        let back: Message = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(back, Message::user("hi"));
    }

    #[test]
    fn request_builder() {
        let req = LlmRequest::new(vec![Message::system("sys"), Message::user("u")])
            .with_timeout(50)
            .with_max_tokens(10);
        assert_eq!(req.system_prompt(), Some("sys"));
        assert_eq!(req.timeout_ms, 50);
        assert_eq!(req.max_tokens, 10);
        assert!(req.response_schema.is_none());
    }
}
