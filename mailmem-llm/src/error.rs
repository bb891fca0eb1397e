//! Errors at the language-model boundary.

use thiserror::Error;

/// Why a model call (or the interpretation of its output) failed.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The endpoint answered with a non-success status.
    #[error("HTTP {status} from {endpoint}: {body}")]
    Http {
        /// URL that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The request never produced a response (DNS, TLS, reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The call exceeded its deadline.
    #[error("model call timed out after {0}ms")]
    Timeout(u64),

    /// No model is configured or reachable.
    #[error("no language model available: {0}")]
    Unavailable(String),

    /// Every transport attempt failed.
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },

    /// The response body or message content was not the JSON expected.
    #[error("model output is not valid JSON: {0}")]
    Parse(String),

    /// The JSON parsed but violates the requested schema.
    #[error("model output does not match `{schema}`: {reason}")]
    Schema {
        /// Schema name.
        schema: String,
        /// What was wrong.
        reason: String,
    },

    /// Invalid client or prompt configuration.
    #[error("invalid model configuration: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether a transport-level retry could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) => true,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(0)
        } else if err.is_connect() {
            LlmError::Unavailable(err.to_string())
        } else {
            LlmError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(LlmError::Timeout(10).is_transient());
        assert!(LlmError::Http { endpoint: "x".into(), status: 503, body: String::new() }.is_transient());
        assert!(LlmError::Http { endpoint: "x".into(), status: 429, body: String::new() }.is_transient());
        assert!(!LlmError::Http { endpoint: "x".into(), status: 400, body: String::new() }.is_transient());
        assert!(!LlmError::Parse("x".into()).is_transient());
    }
}
