//! Tracing subscriber setup.

use mailmem_core::config::TelemetryConfig;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{AgentError, Result};

/// The filter: `RUST_LOG` when set, otherwise `config.log_level`.
///
/// # Errors
///
/// Returns [`AgentError::Config`] if `log_level` is not a valid directive.
pub fn env_filter(config: &TelemetryConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level)
            .map_err(|e| AgentError::Config(format!("invalid log level '{}': {e}", config.log_level))),
    }
}

/// Install the global subscriber: human-readable lines, or JSON lines when
/// `config.json` is set.
///
/// # Errors
///
/// Fails on an invalid filter, or if a global subscriber is already set.
pub fn init(config: &TelemetryConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| AgentError::Config(format!("tracing already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_level_is_a_config_error() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = TelemetryConfig {
            log_level: "mailmem=notalevel".into(),
            json: false,
        };
        assert!(matches!(env_filter(&config), Err(AgentError::Config(_))));
        assert!(env_filter(&TelemetryConfig::default()).is_ok());
    }
}
