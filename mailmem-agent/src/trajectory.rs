//! Append-only record of one response-agent conversation.

use std::fmt::Write as _;

use mailmem_llm::{Message, Role};
use serde::{Deserialize, Serialize};

/// Every message of one agent run, in order.
///
/// Messages are only ever appended. A run that fails or is cancelled leaves
/// a valid prefix behind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory {
    messages: Vec<Message>,
}

impl Trajectory {
    /// An empty trajectory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages so far.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The closing assistant text, if the run ended with a plain answer.
    #[must_use]
    pub fn final_text(&self) -> Option<&str> {
        self.last()
            .filter(|m| m.role == Role::Assistant && !m.has_tool_calls())
            .map(|m| m.content.as_str())
    }

    /// Names of the tools called, in call order.
    pub fn tool_names(&self) -> impl Iterator<Item = &str> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.name.as_str()))
    }

    /// Plain-text transcript for optimizer prompts. System messages are left out.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for m in &self.messages {
            match m.role {
                Role::System => continue,
                Role::Tool => {
                    let name = m.name.as_deref().unwrap_or("tool");
                    let _ = writeln!(out, "tool[{name}]: {}", m.content);
                }
                Role::User | Role::Assistant => {
                    if !m.content.is_empty() {
                        let _ = writeln!(out, "{}: {}", m.role, m.content);
                    }
                    for call in &m.tool_calls {
                        let _ = writeln!(out, "{} -> {}({})", m.role, call.name, call.arguments);
                    }
                }
            }
        }
        out
    }
}

impl From<Vec<Message>> for Trajectory {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}
