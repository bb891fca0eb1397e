//! Configuration for the mailmem system.
//!
//! Maps directly to `mailmem.toml`. Every section and field has a default, so
//! an empty file is a valid configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration, loadable from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailmemConfig {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,
    /// Memory store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Embedding provider for vector search.
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Few-shot and episodic retrieval limits.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Language-model endpoint.
    #[serde(default)]
    pub llm: LlmConfig,
    /// Triage and response agent behaviour.
    #[serde(default)]
    pub agent: AgentConfig,
    /// Logging output.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl MailmemConfig {
    /// Load configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `MemoryError::Config` if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> crate::error::Result<Self> {
        toml::from_str(toml_str).map_err(|e| crate::MemoryError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// General system settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Whether feedback may rewrite prompts. When off, prompts stay frozen
    /// at their current text.
    #[serde(default = "default_true")]
    pub learning: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { learning: true }
    }
}

/// Memory store backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend: "memory" or "sqlite".
    #[serde(default = "default_memory")]
    pub backend: String,
    /// Database file for the sqlite backend; `None` opens an in-memory database.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Enable SQLite WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// Store and verify a CRC-32 of every value.
    #[serde(default = "default_true")]
    pub checksum_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: None,
            wal_mode: true,
            checksum_enabled: true,
        }
    }
}

/// Embedding provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "hashing", "stub" or "none" (unindexed store).
    #[serde(default = "default_hashing")]
    pub provider: String,
    /// Vector dimensionality.
    #[serde(default = "default_256")]
    pub dimensions: usize,
    /// LRU cache entries in front of the provider; 0 disables caching.
    #[serde(default = "default_1024")]
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            dimensions: 256,
            cache_capacity: 1024,
        }
    }
}

/// Retrieval limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Few-shot examples included in a triage prompt.
    #[serde(default = "default_5_usize")]
    pub few_shot_limit: usize,
    /// Default number of episodes returned by `search_memory`.
    #[serde(default = "default_5_usize")]
    pub recall_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            few_shot_limit: 5,
            recall_limit: 5,
        }
    }
}

/// Language-model endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider: "ollama", "openai" or "none".
    #[serde(default = "default_ollama")]
    pub provider: String,
    /// Base URL of the API.
    #[serde(default = "default_ollama_url")]
    pub base_url: String,
    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,
    /// Environment variable holding the API key (OpenAI-compatible only).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// HTTP timeout for a single request in milliseconds.
    #[serde(default = "default_30000")]
    pub request_timeout_ms: u64,
    /// Transport-level retries. Keep at 0 to leave retry policy to the agent.
    #[serde(default)]
    pub max_retries: u32,
    /// Sampling temperature.
    #[serde(default)]
    pub temperature: f32,
    /// Maximum tokens per completion.
    #[serde(default = "default_1024_u32")]
    pub max_tokens: u32,
    /// Directory of TOML prompt overrides; built-in templates when unset.
    #[serde(default)]
    pub prompt_dir: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5:7b-instruct".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_ms: 30_000,
            max_retries: 0,
            temperature: 0.0,
            max_tokens: 1024,
            prompt_dir: None,
        }
    }
}

/// Triage and response agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Application segment of the semantic and episodic namespaces.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// Model calls allowed in one response loop before `LoopExceeded`.
    #[serde(default = "default_10")]
    pub max_iterations: usize,
    /// Deadline for one model call inside the response loop, in milliseconds.
    #[serde(default = "default_60000")]
    pub call_timeout_ms: u64,
    /// Whose inbox this is.
    #[serde(default)]
    pub profile: ProfileConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            app_name: "email_assistant".to_string(),
            max_iterations: 10,
            call_timeout_ms: 60_000,
            profile: ProfileConfig::default(),
        }
    }
}

/// The inbox owner, rendered into triage and agent prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Short name used in instructions ("John").
    #[serde(default = "default_profile_name")]
    pub name: String,
    /// Full name used in instructions and sign-offs.
    #[serde(default = "default_profile_full_name")]
    pub full_name: String,
    /// One-line description of the owner's role.
    #[serde(default = "default_profile_background")]
    pub background: String,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name: default_profile_name(),
            full_name: default_profile_full_name(),
            background: default_profile_background(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Default filter directive; `RUST_LOG` overrides it.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde default helpers
// ---------------------------------------------------------------------------

fn default_true() -> bool { true }
fn default_memory() -> String { "memory".to_string() }
fn default_hashing() -> String { "hashing".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_ollama() -> String { "ollama".to_string() }
fn default_ollama_url() -> String { "http://localhost:11434".to_string() }
fn default_model() -> String { "qwen2.5:7b-instruct".to_string() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".to_string() }
fn default_app_name() -> String { "email_assistant".to_string() }
fn default_profile_name() -> String { "John".to_string() }
fn default_profile_full_name() -> String { "John Doe".to_string() }
fn default_profile_background() -> String { "Senior software engineer leading a team of 5 developers".to_string() }
fn default_5_usize() -> usize { 5 }
fn default_10() -> usize { 10 }
fn default_256() -> usize { 256 }
fn default_1024() -> usize { 1024 }
fn default_1024_u32() -> u32 { 1024 }
fn default_30000() -> u64 { 30_000 }
fn default_60000() -> u64 { 60_000 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = MailmemConfig::from_toml("").expect("parse");
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.embedding.provider, "hashing");
        assert_eq!(config.agent.max_iterations, 10);
        assert_eq!(config.llm.max_retries, 0);
        assert_eq!(config.agent.profile.name, "John");
        assert!(config.general.learning);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = MailmemConfig::from_toml(
            r#"
            [store]
            backend = "sqlite"
            path = "/tmp/mail.db"

            [agent.profile]
            name = "Jordan"
            "#,
        )
        .expect("parse");
        assert_eq!(config.store.backend, "sqlite");
        assert_eq!(config.store.path, Some(PathBuf::from("/tmp/mail.db")));
        assert!(config.store.wal_mode);
        assert_eq!(config.agent.profile.name, "Jordan");
        assert_eq!(config.agent.profile.full_name, "John Doe");
        assert_eq!(config.agent.app_name, "email_assistant");
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let err = MailmemConfig::from_toml("store = 3").expect_err("invalid");
        assert!(matches!(err, crate::MemoryError::Config(_)));
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mailmem.toml");
        std::fs::write(&path, "[telemetry]\njson = true\n").expect("write");
        let config = MailmemConfig::from_file(&path).expect("load");
        assert!(config.telemetry.json);
        assert_eq!(config.telemetry.log_level, "info");
    }
}
