//! LLM Client: one chat interface over Ollama and OpenAI-compatible backends.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::types::{LlmRequest, Message, Role, ToolCall, ToolSpec};

/// Anything that can answer a chat request.
///
/// Implementations must honour `request.tools` (the reply may carry tool
/// calls) and `request.response_schema` (the reply content must be JSON
/// matching it) as far as the backend allows; callers still validate.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Produce the next assistant message for the conversation.
    async fn generate(&self, request: &LlmRequest) -> Result<Message, LlmError>;

    /// Model identifier, for logs.
    fn model_name(&self) -> &str;
}

/// Provider backend for LLM inference.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    /// Ollama running locally (`/api/chat`).
    Ollama {
        /// e.g. `http://localhost:11434`
        base_url: String,
    },
    /// OpenAI-compatible API (`/v1/chat/completions`).
    OpenAiCompatible {
        /// e.g. `https://api.openai.com`
        base_url: String,
        /// Bearer token.
        api_key: String,
    },
    /// No LLM available; every call returns [`LlmError::Unavailable`].
    None,
}

/// HTTP client that routes requests to the configured backend.
pub struct LlmClient {
    provider: LlmProvider,
    http: Client,
    model: String,
    max_retries: u32,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let provider = match &self.provider {
            LlmProvider::Ollama { .. } => "ollama",
            LlmProvider::OpenAiCompatible { .. } => "openai",
            LlmProvider::None => "none",
        };
        f.debug_struct("LlmClient")
            .field("provider", &provider)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl LlmClient {
    /// Create a client for `model` on `provider`. No transport retries.
    #[must_use]
    pub fn new(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            http: Client::new(),
            model: model.into(),
            max_retries: 0,
        }
    }

    /// Retry failed transport attempts up to `max_retries` extra times.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Create a client with no LLM backend.
    #[must_use]
    pub fn none() -> Self {
        Self::new(LlmProvider::None, "")
    }

    /// Check if the LLM client has a backend configured.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !matches!(self.provider, LlmProvider::None)
    }

    async fn post_json(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
        timeout_ms: u64,
    ) -> Result<Value, LlmError> {
        let mut last_error = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!(attempt = attempt + 1, max = self.max_retries + 1, "Retrying LLM call");
            }

            let start = Instant::now();
            let mut builder = self
                .http
                .post(url)
                .json(body)
                .timeout(Duration::from_millis(timeout_ms));
            if let Some(token) = bearer {
                builder = builder.bearer_auth(token);
            }

            let err = match builder.send().await {
                Ok(resp) if resp.status().is_success() => {
                    let json: Value = resp
                        .json()
                        .await
                        .map_err(|e| LlmError::Parse(e.to_string()))?;
                    debug!(
                        url,
                        model = %self.model,
                        latency_ms = start.elapsed().as_millis(),
                        "LLM call completed"
                    );
                    return Ok(json);
                }
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let mut text = resp.text().await.unwrap_or_default();
                    text.truncate(512);
                    LlmError::Http {
                        endpoint: url.to_owned(),
                        status,
                        body: text,
                    }
                }
                Err(e) if e.is_timeout() => LlmError::Timeout(timeout_ms),
                Err(e) => LlmError::from(e),
            };

            warn!(url, attempt = attempt + 1, error = %err, "LLM call failed");
            if self.max_retries == 0 {
                return Err(err);
            }
            if !err.is_transient() {
                return Err(err);
            }
            last_error = err.to_string();
        }

        Err(LlmError::RetriesExhausted {
            attempts: self.max_retries + 1,
            last_error,
        })
    }

    async fn generate_ollama(&self, base_url: &str, request: &LlmRequest) -> Result<Message, LlmError> {
        let url = format!("{}/api/chat", base_url.trim_end_matches('/'));
        let body = ollama_body(&self.model, request);
        let json = self.post_json(&url, None, &body, request.timeout_ms).await?;
        parse_ollama_reply(&json)
    }

    async fn generate_openai(
        &self,
        base_url: &str,
        api_key: &str,
        request: &LlmRequest,
    ) -> Result<Message, LlmError> {
        let url = format!("{}/v1/chat/completions", base_url.trim_end_matches('/'));
        let body = openai_body(&self.model, request);
        let json = self.post_json(&url, Some(api_key), &body, request.timeout_ms).await?;
        parse_openai_reply(&json)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    async fn generate(&self, request: &LlmRequest) -> Result<Message, LlmError> {
        match &self.provider {
            LlmProvider::None => Err(LlmError::Unavailable("No LLM provider configured".into())),
            LlmProvider::Ollama { base_url } => self.generate_ollama(base_url, request).await,
            LlmProvider::OpenAiCompatible { base_url, api_key } => {
                self.generate_openai(base_url, api_key, request).await
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// Wire formats
// ---------------------------------------------------------------------------

fn function_tools(tools: &[ToolSpec]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|t| {
                json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn ollama_body(model: &str, request: &LlmRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| {
            let mut wire = json!({ "role": m.role.to_string(), "content": m.content });
            if m.has_tool_calls() {
                wire["tool_calls"] = Value::Array(
                    m.tool_calls
                        .iter()
                        .map(|c| json!({ "function": { "name": c.name, "arguments": c.arguments } }))
                        .collect(),
                );
            }
            wire
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "stream": false,
        "options": {
            "temperature": request.temperature,
            "num_predict": request.max_tokens,
        }
    });
    if !request.tools.is_empty() {
        body["tools"] = function_tools(&request.tools);
    }
    if let Some(schema) = &request.response_schema {
        body["format"] = schema.schema.clone();
    }
    body
}

fn parse_ollama_reply(json: &Value) -> Result<Message, LlmError> {
    let message = json
        .get("message")
        .ok_or_else(|| LlmError::Parse(format!("Ollama reply has no `message`: {json}")))?;
    let content = message["content"].as_str().unwrap_or_default().to_owned();
    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(i, call)| {
                    let function = call.get("function")?;
                    Some(ToolCall {
                        id: call["id"]
                            .as_str()
                            .map_or_else(|| format!("call_{i}"), str::to_owned),
                        name: function["name"].as_str()?.to_owned(),
                        arguments: decode_arguments(&function["arguments"]),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(Message::assistant_tool_calls(content, tool_calls))
}

fn openai_body(model: &str, request: &LlmRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| {
            let mut wire = json!({ "role": m.role.to_string(), "content": m.content });
            if m.has_tool_calls() {
                wire["tool_calls"] = Value::Array(
                    m.tool_calls
                        .iter()
                        .map(|c| {
                            json!({
                                "id": c.id,
                                "type": "function",
                                "function": { "name": c.name, "arguments": c.arguments.to_string() }
                            })
                        })
                        .collect(),
                );
            }
            if m.role == Role::Tool {
                if let Some(id) = &m.tool_call_id {
                    wire["tool_call_id"] = json!(id);
                }
            }
            wire
        })
        .collect();

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "temperature": request.temperature,
    });
    if !request.tools.is_empty() {
        body["tools"] = function_tools(&request.tools);
    }
    if let Some(schema) = &request.response_schema {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": { "name": schema.name, "schema": schema.schema, "strict": true }
        });
    }
    body
}

fn parse_openai_reply(json: &Value) -> Result<Message, LlmError> {
    let message = json
        .pointer("/choices/0/message")
        .ok_or_else(|| LlmError::Parse(format!("OpenAI reply has no choices[0].message: {json}")))?;
    let content = message["content"].as_str().unwrap_or_default().to_owned();
    let tool_calls = message["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| {
                    Some(ToolCall {
                        id: call["id"].as_str()?.to_owned(),
                        name: call.pointer("/function/name")?.as_str()?.to_owned(),
                        arguments: decode_arguments(&call["function"]["arguments"]),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(Message::assistant_tool_calls(content, tool_calls))
}

/// Tool arguments arrive either as an object or as a JSON-encoded string.
fn decode_arguments(raw: &Value) -> Value {
    match raw {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.clone())),
        Value::Null => json!({}),
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Structured output
// ---------------------------------------------------------------------------

/// Parse an assistant message's content as structured JSON.
///
/// Tolerates a surrounding Markdown code fence (```` ```json ... ``` ````),
/// which some models add despite a schema constraint.
///
/// # Errors
///
/// Returns [`LlmError::Parse`] if the content is not valid JSON for `T`.
pub fn parse_structured<T: DeserializeOwned>(message: &Message) -> Result<T, LlmError> {
    let text = strip_code_fence(&message.content);
    serde_json::from_str(text)
        .map_err(|e| LlmError::Parse(format!("{e}; raw text: '{}'", message.content)))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
