//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Service configuration, read from `FIT_COACH_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port for the HTTP/SSE server.
    pub port: u16,
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Idle window after which a silent agent stream is terminated.
    pub stream_idle_timeout: Duration,
    /// Maximum conversation turns returned by the history endpoint.
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/fit-coach.db"),
            stream_idle_timeout: Duration::from_secs(30),
            history_limit: 200,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = match std::env::var("FIT_COACH_PORT") {
            Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
                key: "FIT_COACH_PORT".to_string(),
                message: format!("not a valid port: {v}"),
            })?,
            Err(_) => defaults.port,
        };

        let db_path = std::env::var("FIT_COACH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let stream_idle_timeout = match std::env::var("FIT_COACH_STREAM_IDLE_SECS") {
            Ok(v) => {
                let secs: u64 = v.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "FIT_COACH_STREAM_IDLE_SECS".to_string(),
                    message: format!("not a valid number of seconds: {v}"),
                })?;
                Duration::from_secs(secs)
            }
            Err(_) => defaults.stream_idle_timeout,
        };

        Ok(Self {
            port,
            db_path,
            stream_idle_timeout,
            history_limit: defaults.history_limit,
        })
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Read the provider configuration from the environment.
    ///
    /// `ANTHROPIC_API_KEY` is required; `FIT_COACH_MODEL` is optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".to_string()))?;
        let model = std::env::var("FIT_COACH_MODEL")
            .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
        Ok(Self {
            api_key: secrecy::SecretString::from(api_key),
            model,
        })
    }
}
