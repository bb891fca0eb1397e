//! Prompt templates for mailmem LLM operations.
//!
//! Every prompt is a versioned, testable artifact. The constants below are the
//! built-in defaults; [`PromptEngine::from_directory`] can override any of them
//! from TOML files.

use serde_json::json;

use crate::types::ResponseSchema;

/// Triage system prompt. Rule placeholders are filled from procedural memory.
pub const TRIAGE_SYSTEM: &str = r#"
< Role >
You are {full_name}'s executive assistant. You are a top-notch executive assistant who cares about {name} performing as well as possible.
</ Role >

< Background >
{user_profile_background}.
</ Background >

< Instructions >

{name} gets lots of emails. Your job is to categorize each email into one of three categories:

1. IGNORE - Emails that are not worth responding to or tracking
2. NOTIFY - Important information that {name} should know about but doesn't require a response
3. RESPOND - Emails that need a direct response from {name}

Classify the below email into one of these categories.

</ Instructions >

< Rules >
Emails that are not worth responding to:
{triage_no}

There are also other things that {name} should know about, but don't require an email response. For these, you should notify {name} (using the `notify` response). Examples of this include:
{triage_notify}

Emails that are worth responding to:
{triage_email}
</ Rules >

< Few shot examples >

Here are some examples of previous emails, and how they should be handled.
Follow these examples more than any instructions above

{examples}
</ Few shot examples >

Reply with a JSON object: {{"reasoning": "step-by-step reasoning", "classification": "ignore" | "notify" | "respond"}}"#;

pub const TRIAGE_USER: &str = r"Please determine how to handle the below email thread:

From: {author}
To: {to}
Subject: {subject}
{email_thread}";

/// Sent after the triage reply failed validation.
pub const TRIAGE_CORRECTION: &str = r#"Your previous reply could not be used: {error}.
Reply again with only a JSON object containing a non-empty "reasoning" string and a "classification" that is exactly one of "ignore", "notify" or "respond"."#;

/// One stored example inside the few-shot block.
pub const FEW_SHOT_EXAMPLE: &str = r"Email Subject: {subject}
Email From: {from_email}
Email To: {to_email}
Email Content:
```
{content}
```
> Triage Result: {result}";

pub const FEW_SHOT_HEADER: &str = "Here are some previous examples:";
pub const FEW_SHOT_SEPARATOR: &str = "\n\n------------\n\n";
pub const NO_EXAMPLES: &str = "No examples available.";

/// Few-shot example content is cut to this many characters.
pub const FEW_SHOT_CONTENT_CHARS: usize = 400;

/// Response agent system prompt. `{tools}` is the numbered tool list.
pub const AGENT_SYSTEM: &str = r"
< Role >
You are {full_name}'s executive assistant. You are a top-notch executive assistant who cares about {name} performing as well as possible.
</ Role >

< Tools >
You have access to the following tools to help manage {name}'s communications and schedule:

{tools}
</ Tools >

< Instructions >
{instructions}
</ Instructions >
";

pub const AGENT_USER: &str = r"Respond to the email {email}

Triage notes: {context}";

/// Optimizer step 1: pick the prompts the feedback is about.
pub const OPTIMIZER_SELECT_SYSTEM: &str = r#"You are helping an AI assistant learn from user feedback by improving its prompts.

< Prompts >
The assistant uses the prompts below. Each one states when it should be updated.

{prompts}
</ Prompts >

Read the conversation and the feedback. Decide which prompts, if any, must change so the assistant behaves as the feedback asks next time.
Only choose a prompt when its update criterion matches the subject of the feedback.

Reply with a JSON object: {{"prompt_names": ["name", ...]}}. Use an empty list if nothing should change."#;

pub const OPTIMIZER_SELECT_USER: &str = r"< Conversation >
{trajectory}
</ Conversation >

< Feedback >
{feedback}
</ Feedback >";

/// Optimizer step 2: rewrite one selected prompt.
pub const OPTIMIZER_REWRITE_SYSTEM: &str = r#"You are improving the prompt "{prompt_name}" used by an AI assistant, based on user feedback.

< Current prompt >
{current_prompt}
</ Current prompt >

< When to update >
{when_to_update}
</ When to update >

< Update instructions >
{update_instructions}
</ Update instructions >

Rewrite the prompt so that the assistant follows the feedback from now on. Preserve the original intent of the prompt.
If the prompt already covers the feedback, return it unchanged.

Reply with a JSON object: {{"updated_prompt": "the complete new prompt text"}}"#;

pub const OPTIMIZER_REWRITE_USER: &str = OPTIMIZER_SELECT_USER;

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value and `{{` / `}}` with literal
/// braces. Unknown placeholders are left as they are. Substituted values are
/// never re-scanned, so braces inside them survive untouched.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if let Some(end) = tail.strip_prefix('{').and_then(|t| t.find('}')) {
            let key = &tail[1..=end];
            if let Some((_, value)) = vars.iter().find(|(k, _)| *k == key) {
                out.push_str(value);
                rest = &tail[end + 2..];
                continue;
            }
        }
        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Structured output schemas
// ---------------------------------------------------------------------------

/// `{reasoning, classification}` for the triage router.
#[must_use]
pub fn triage_schema() -> ResponseSchema {
    ResponseSchema {
        name: "router".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "reasoning": {
                    "type": "string",
                    "description": "Step-by-step reasoning behind the classification."
                },
                "classification": {
                    "type": "string",
                    "enum": ["ignore", "notify", "respond"],
                    "description": "ignore for irrelevant emails, notify for important information that doesn't need a response, respond for emails that need a reply"
                }
            },
            "required": ["reasoning", "classification"],
            "additionalProperties": false
        }),
    }
}

/// `{prompt_names: [..]}` for optimizer selection.
#[must_use]
pub fn prompt_selection_schema() -> ResponseSchema {
    ResponseSchema {
        name: "prompt_selection".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "prompt_names": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["prompt_names"],
            "additionalProperties": false
        }),
    }
}

/// `{updated_prompt}` for optimizer rewrites.
#[must_use]
pub fn prompt_rewrite_schema() -> ResponseSchema {
    ResponseSchema {
        name: "prompt_rewrite".into(),
        schema: json!({
            "type": "object",
            "properties": {
                "updated_prompt": { "type": "string" }
            },
            "required": ["updated_prompt"],
            "additionalProperties": false
        }),
    }
}

// ---------------------------------------------------------------------------
// PromptEngine: versioned TOML template loader
// ---------------------------------------------------------------------------

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::LlmError;

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Email triage router.
    Triage,
    /// Response agent.
    Agent,
    /// Optimizer step 1.
    OptimizerSelect,
    /// Optimizer step 2.
    OptimizerRewrite,
}

impl PromptId {
    /// Returns the TOML filename (without path) for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::Triage => "triage.toml",
            Self::Agent => "agent.toml",
            Self::OptimizerSelect => "optimizer_select.toml",
            Self::OptimizerRewrite => "optimizer_rewrite.toml",
        }
    }

    /// All prompt IDs.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[
            Self::Triage,
            Self::Agent,
            Self::OptimizerSelect,
            Self::OptimizerRewrite,
        ]
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Triage => "triage",
            Self::Agent => "agent",
            Self::OptimizerSelect => "optimizer_select",
            Self::OptimizerRewrite => "optimizer_rewrite",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triage" => Ok(Self::Triage),
            "agent" => Ok(Self::Agent),
            "optimizer_select" => Ok(Self::OptimizerSelect),
            "optimizer_rewrite" => Ok(Self::OptimizerRewrite),
            _ => Err(LlmError::Config(format!("unknown prompt id: '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    temperature: Option<f32>,
    system: String,
    user: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Prompt version string (`"builtin"` for compiled-in templates).
    pub version: String,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// System prompt template (contains `{key}` placeholders).
    pub system: String,
    /// User prompt template (contains `{key}` placeholders).
    pub user: String,
}

impl PromptTemplate {
    fn builtin(max_tokens: u32, system: &str, user: &str) -> Self {
        Self {
            version: "builtin".into(),
            max_tokens,
            temperature: 0.0,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Engine that holds the prompt templates and renders them.
///
/// # Example
///
/// ```no_run
/// use mailmem_llm::prompt::{PromptEngine, PromptId};
///
/// let engine = PromptEngine::from_directory("mailmem-llm/prompts/v1").unwrap();
/// let (system, user) = engine
///     .render(PromptId::OptimizerSelect, &[("prompts", "..."), ("feedback", "be brief")])
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptEngine {
    /// Create a `PromptEngine` pre-loaded with the built-in constant templates.
    #[must_use]
    pub fn builtin() -> Self {
        let mut templates = HashMap::new();
        templates.insert(PromptId::Triage, PromptTemplate::builtin(512, TRIAGE_SYSTEM, TRIAGE_USER));
        templates.insert(PromptId::Agent, PromptTemplate::builtin(1024, AGENT_SYSTEM, AGENT_USER));
        templates.insert(
            PromptId::OptimizerSelect,
            PromptTemplate::builtin(256, OPTIMIZER_SELECT_SYSTEM, OPTIMIZER_SELECT_USER),
        );
        templates.insert(
            PromptId::OptimizerRewrite,
            PromptTemplate::builtin(1024, OPTIMIZER_REWRITE_SYSTEM, OPTIMIZER_REWRITE_USER),
        );
        Self { templates }
    }

    /// Load the built-ins, then override them from a directory of TOML files.
    ///
    /// Each TOML file must match a known [`PromptId`] filename; missing files
    /// keep the built-in template, unknown files are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the directory does not exist, or a TOML
    /// file exists but cannot be read or parsed.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, LlmError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(LlmError::Config(format!(
                "prompt directory not found: {}",
                dir.display()
            )));
        }

        let mut engine = Self::builtin();
        for id in PromptId::all() {
            let path: PathBuf = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| LlmError::Config(format!("failed to read {}: {e}", path.display())))?;
            let parsed: TomlPromptFile = toml::from_str(&content)
                .map_err(|e| LlmError::Config(format!("failed to parse {}: {e}", path.display())))?;

            let d = parsed.prompt;
            let (max_tokens, temperature) = engine
                .get(*id)
                .map_or((1024, 0.0), |base| (base.max_tokens, base.temperature));
            let template = PromptTemplate {
                version: d.version,
                max_tokens: d.max_tokens.unwrap_or(max_tokens),
                temperature: d.temperature.unwrap_or(temperature),
                system: d.system,
                user: d.user,
            };
            tracing::debug!(prompt = %id, version = %template.version, "Loaded prompt override");
            engine.templates.insert(*id, template);
        }
        Ok(engine)
    }

    /// Get a prompt template by ID.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render both system and user prompts for a given ID.
    ///
    /// Returns `(system_prompt, user_prompt)` with all `{key}` placeholders
    /// replaced.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Config`] if the prompt ID is not loaded.
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<(String, String), LlmError> {
        let tpl = self
            .get(id)
            .ok_or_else(|| LlmError::Config(format!("prompt template '{id}' not loaded")))?;
        Ok((render_template(&tpl.system, vars), render_template(&tpl.user, vars)))
    }

    /// Number of loaded templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether no templates are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_rendering_works() {
        let rendered = render_template(
            "Hello {name}, you are {role}.",
            &[("name", "John"), ("role", "busy")],
        );
        assert_eq!(rendered, "Hello John, you are busy.");
    }

    #[test]
    fn template_handles_missing_vars_and_escapes() {
        let rendered = render_template("{name}: {{\"k\": {unknown}}}", &[("name", "John")]);
        assert_eq!(rendered, "John: {\"k\": {unknown}}");
    }

    #[test]
    fn substituted_values_keep_their_braces() {
        let rendered = render_template("Input: {input}", &[("input", r#"{"a":{"b":1}}"#)]);
        assert_eq!(rendered, r#"Input: {"a":{"b":1}}"#);
    }

    #[test]
    fn prompt_id_from_str_round_trip() {
        for id in PromptId::all() {
            let parsed: PromptId = id.to_string().parse().expect("should parse");
            assert_eq!(*id, parsed);
        }
        assert!("nonexistent".parse::<PromptId>().is_err());
    }

    #[test]
    fn builtin_engine_renders_triage() {
        let engine = PromptEngine::builtin();
        assert_eq!(engine.len(), PromptId::all().len());
        let (system, user) = engine
            .render(
                PromptId::Triage,
                &[
                    ("full_name", "John Doe"),
                    ("name", "John"),
                    ("user_profile_background", "Senior software engineer"),
                    ("triage_no", "Marketing newsletters"),
                    ("triage_notify", "Build system notifications"),
                    ("triage_email", "Meeting requests"),
                    ("examples", NO_EXAMPLES),
                    ("author", "alice@company.com"),
                    ("to", "john@company.com"),
                    ("subject", "Quarterly build failed"),
                    ("email_thread", "The nightly build failed."),
                ],
            )
            .expect("render should succeed");
        assert!(system.contains("You are John Doe's executive assistant"));
        assert!(system.contains("Build system notifications"));
        assert!(system.contains("No examples available."));
        assert!(system.contains(r#"{"reasoning""#));
        assert!(!system.contains("{name}"));
        assert!(user.contains("Subject: Quarterly build failed"));
    }

    #[test]
    fn schemas_require_their_fields() {
        assert_eq!(triage_schema().schema["required"], json!(["reasoning", "classification"]));
        assert_eq!(
            triage_schema().schema["properties"]["classification"]["enum"],
            json!(["ignore", "notify", "respond"])
        );
        assert_eq!(prompt_selection_schema().schema["required"], json!(["prompt_names"]));
        assert_eq!(prompt_rewrite_schema().schema["required"], json!(["updated_prompt"]));
    }

    #[test]
    fn from_directory_overrides_builtins() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("agent.toml"),
            "[prompt]\nversion = \"2.0\"\nsystem = \"Be {name}.\"\nuser = \"{email}\"\n",
        )
        .expect("write");

        let engine = PromptEngine::from_directory(dir.path()).expect("load");
        let agent = engine.get(PromptId::Agent).expect("agent");
        assert_eq!(agent.version, "2.0");
        assert_eq!(agent.max_tokens, 1024);
        assert_eq!(engine.get(PromptId::Triage).expect("triage").version, "builtin");
    }

    #[test]
    fn from_directory_rejects_bad_toml() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("triage.toml"), "[prompt]\nversion = 1").expect("write");
        assert!(matches!(
            PromptEngine::from_directory(dir.path()),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn from_directory_loads_shipped_prompts() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/v1");
        let engine = PromptEngine::from_directory(dir).expect("should load");
        for id in PromptId::all() {
            assert_ne!(engine.get(*id).expect("loaded").version, "builtin", "{id}");
        }
    }

    #[test]
    fn from_directory_errors_on_missing_dir() {
        assert!(PromptEngine::from_directory("/tmp/nonexistent_mailmem_prompts_dir").is_err());
    }
}
