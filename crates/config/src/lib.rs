//! Layered application configuration.
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! environment variables.  Validation runs once at the end and fails fast,
//! so a session is never constructed from out-of-bounds settings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// LM endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Endpoint root; a trailing slash is stripped during resolution.
    pub base_url: String,
    /// Bearer token.  Its absence is not a load error — the gateway fails
    /// hard on the first call instead, so read-only commands keep working.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

/// Generation parameters for one agent role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentGenSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Content-level retries on schema/parse failure; transport retries are
    /// the gateway's business.
    pub generation_retries: u32,
}

impl Default for AgentGenSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 800,
            generation_retries: 0,
        }
    }
}

/// Per-role generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentsSettings {
    pub observer: AgentGenSettings,
    pub interviewer: AgentGenSettings,
    pub evaluator: AgentGenSettings,
}

impl Default for AgentsSettings {
    fn default() -> Self {
        Self {
            observer: AgentGenSettings {
                temperature: 0.3,
                max_tokens: 1000,
                generation_retries: 2,
            },
            interviewer: AgentGenSettings {
                temperature: 0.7,
                max_tokens: 800,
                generation_retries: 0,
            },
            evaluator: AgentGenSettings {
                temperature: 0.3,
                max_tokens: 3000,
                generation_retries: 2,
            },
        }
    }
}

/// Session-level knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub max_turns: u32,
    /// Turns of transcript handed to the Interviewer per call.
    pub history_window_turns: usize,
    pub log_dir: PathBuf,
    pub job_description: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_turns: 20,
            history_window_turns: 10,
            log_dir: PathBuf::from("logs/interviews"),
            job_description: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceSettings {
    pub enabled: bool,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub agents: AgentsSettings,
    pub session: SessionSettings,
    pub trace: TraceSettings,
}

impl AppConfig {
    /// Loads configuration from `path` (when it exists) and the
    /// environment, then validates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str(&raw).map_err(|err| ConfigError::Parse {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Environment variables recognized on top of the file layer.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = env_string("LITELLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = env_string("LITELLM_API_KEY") {
            self.llm.api_key = Some(value);
        }
        if let Some(value) = env_string("LITELLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = env_parsed("LITELLM_TIMEOUT")? {
            self.llm.timeout_secs = value;
        }
        if let Some(value) = env_parsed("LITELLM_MAX_RETRIES")? {
            self.llm.max_retries = value;
        }
        if let Some(value) = env_parsed("MAX_TURNS")? {
            self.session.max_turns = value;
        }
        if let Some(value) = env_parsed("HISTORY_WINDOW_TURNS")? {
            self.session.history_window_turns = value;
        }
        if let Some(value) = env_string("INTERVIEW_LOG_DIR") {
            self.session.log_dir = PathBuf::from(value);
        }
        if let Some(value) = env_parsed("TRACE_ENABLED")? {
            self.trace.enabled = value;
        }
        Ok(())
    }

    fn normalize(&mut self) {
        self.llm.base_url = self.llm.base_url.trim_end_matches('/').to_string();
        if let Some(job) = &self.session.job_description {
            let trimmed = job.trim();
            self.session.job_description = if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            };
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.base_url.trim().is_empty() {
            return invalid("llm.base_url", "must not be empty");
        }
        if self.llm.model.trim().is_empty() {
            return invalid("llm.model", "must not be empty");
        }
        if self.llm.timeout_secs < 1 {
            return invalid("llm.timeout_secs", "must be at least 1 second");
        }
        if self.session.max_turns < 1 {
            return invalid("session.max_turns", "must be at least 1");
        }
        if self.session.history_window_turns < 1 {
            return invalid("session.history_window_turns", "must be at least 1");
        }

        for (role, settings) in [
            ("observer", &self.agents.observer),
            ("interviewer", &self.agents.interviewer),
            ("evaluator", &self.agents.evaluator),
        ] {
            if !(0.0..=2.0).contains(&settings.temperature) {
                return invalid(
                    &format!("agents.{role}.temperature"),
                    "must be within [0.0, 2.0]",
                );
            }
            if !(64..=8192).contains(&settings.max_tokens) {
                return invalid(
                    &format!("agents.{role}.max_tokens"),
                    "must be within [64, 8192]",
                );
            }
            if settings.generation_retries > 10 {
                return invalid(
                    &format!("agents.{role}.generation_retries"),
                    "must be within [0, 10]",
                );
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("could not parse {raw:?}"),
        }),
    }
}
