// src/config/ai.rs
use serde::{Deserialize, Serialize};

use super::{is_env_marker, resolve_env};
use crate::error::ConfigError;

pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    crate::summarize::DEFAULT_MODEL.into()
}
fn default_timeout_secs() -> u64 {
    20
}
fn default_concurrency() -> usize {
    3
}
fn default_fallback_chars() -> usize {
    crate::summarize::DEFAULT_FALLBACK_CHARS
}
fn default_max_summary_chars() -> usize {
    400
}

/// `[summarizer]` section. Disabled by default; the digest then carries truncated bodies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Only "openai" (any OpenAI-compatible chat completions endpoint).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fallback_chars")]
    pub fallback_chars: usize,
    #[serde(default = "default_max_summary_chars")]
    pub max_summary_chars: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_provider(),
            api_key: String::new(),
            model: default_model(),
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            fallback_chars: default_fallback_chars(),
            max_summary_chars: default_max_summary_chars(),
        }
    }
}

impl SummarizerConfig {
    /// Normalize the provider and resolve an "ENV" api key. A disabled summarizer is left alone.
    pub(crate) fn resolve(&mut self) -> Result<(), ConfigError> {
        self.provider = self.provider.trim().to_lowercase();
        if !self.enabled {
            return Ok(());
        }
        if self.provider != "openai" {
            return Err(ConfigError::Unsupported {
                field: "summarizer.provider",
                value: self.provider.clone(),
            });
        }
        if is_env_marker(&self.api_key) {
            self.api_key = resolve_env(OPENAI_KEY_ENV)?;
        }
        Ok(())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.api_key.trim().is_empty() || is_env_marker(&self.api_key) {
            return Err(ConfigError::MissingApiKey);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "summarizer.concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "summarizer.timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}
