// src/config/mod.rs
//! Configuration: one TOML or JSON file with `[settings]`, `[delivery]`, `[summarizer]`
//! and `[[sources]]`. Secrets can be given as the marker "ENV" and are then read from
//! the process environment.

pub mod ai;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sources::{Source, SourceRegistry};

pub use ai::SummarizerConfig;

pub const ENV_PATH: &str = "DIGEST_CONFIG_PATH";
pub const WEBHOOK_ENV: &str = "DIGEST_WEBHOOK_URL";
pub const SECRET_ENV: &str = "DIGEST_WEBHOOK_SECRET";

pub(crate) fn is_env_marker(s: &str) -> bool {
    s.trim().eq_ignore_ascii_case("env")
}

pub(crate) fn resolve_env(var: &str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ConfigError::MissingEnv(var.to_string())),
    }
}

/// `[settings]`: run-wide numeric and path settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_news: usize,
    pub dedup_window_hours: u32,
    /// 0 disables the recency cutoff.
    pub max_item_age_hours: u32,
    pub max_entries_per_source: usize,
    pub fetch_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub run_deadline_secs: u64,
    pub state_path: PathBuf,
    pub utc_offset_hours: i32,
    pub suppress_empty: bool,
    pub digest_title: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_news: 10,
            dedup_window_hours: 24,
            max_item_age_hours: 24,
            max_entries_per_source: 50,
            fetch_concurrency: 4,
            fetch_timeout_secs: 15,
            run_deadline_secs: 600,
            state_path: PathBuf::from("state/seen_items.json"),
            utc_offset_hours: 8,
            suppress_empty: true,
            digest_title: "AI Daily Brief".into(),
        }
    }
}

impl Settings {
    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.dedup_window_hours))
    }

    pub fn max_item_age(&self) -> Option<chrono::Duration> {
        (self.max_item_age_hours > 0)
            .then(|| chrono::Duration::hours(i64::from(self.max_item_age_hours)))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn run_deadline(&self) -> Duration {
        Duration::from_secs(self.run_deadline_secs.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::InvalidSetting {
                field,
                reason: reason.to_string(),
            })
        };
        if self.max_news == 0 {
            return invalid("settings.max_news", "must be at least 1");
        }
        if self.dedup_window_hours == 0 {
            return invalid("settings.dedup_window_hours", "must be at least 1");
        }
        if self.fetch_concurrency == 0 {
            return invalid("settings.fetch_concurrency", "must be at least 1");
        }
        if self.max_entries_per_source == 0 {
            return invalid("settings.max_entries_per_source", "must be at least 1");
        }
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return invalid("settings.utc_offset_hours", "must be within -12..=14");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryKind {
    #[default]
    Dingtalk,
    Slack,
}

/// `[delivery]`: the single destination webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub kind: DeliveryKind,
    /// "ENV" means: read from DIGEST_WEBHOOK_URL
    pub webhook: String,
    /// "ENV" means: read from DIGEST_WEBHOOK_SECRET
    pub secret: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            kind: DeliveryKind::Dingtalk,
            webhook: String::new(),
            secret: None,
            timeout_secs: 30,
            max_attempts: 2,
            backoff_ms: 2000,
        }
    }
}

impl DeliveryConfig {
    fn resolve(&mut self) -> Result<(), ConfigError> {
        if is_env_marker(&self.webhook) {
            self.webhook = resolve_env(WEBHOOK_ENV)?;
        }
        if let Some(secret) = &self.secret {
            if is_env_marker(secret) {
                self.secret = Some(resolve_env(SECRET_ENV)?);
            } else if secret.trim().is_empty() {
                self.secret = None;
            }
        }
        self.webhook = self.webhook.trim().to_string();
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.webhook.is_empty() {
            return Err(ConfigError::MissingWebhook);
        }
        let ok = url::Url::parse(&self.webhook)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !ok {
            return Err(ConfigError::InvalidSetting {
                field: "delivery.webhook",
                reason: "not an http(s) url".into(),
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "delivery.max_attempts",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Config {
    /// Load from an explicit path. TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let mut cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing config {}", path.display()))?;
        cfg.resolve_env()?;
        cfg.validate()?;
        tracing::debug!(path = %path.display(), sources = cfg.sources.len(), "config loaded");
        Ok(cfg)
    }

    /// Load using env var + fallbacks:
    /// 1) $DIGEST_CONFIG_PATH
    /// 2) config/digest.toml
    /// 3) config/digest.json
    pub fn load_default() -> Result<Self> {
        Self::load_from(&default_path()?)
    }

    /// Replace "ENV" markers with the corresponding environment variables.
    pub fn resolve_env(&mut self) -> Result<(), ConfigError> {
        self.delivery.resolve()?;
        self.summarizer.resolve()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        self.registry()?;
        self.delivery.validate()?;
        self.summarizer.validate()
    }

    /// Validated source registry.
    pub fn registry(&self) -> Result<SourceRegistry, ConfigError> {
        SourceRegistry::new(self.sources.clone())
    }
}

/// Path `load_default` reads.
pub fn default_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Ok(pb);
        }
        return Err(anyhow!("{ENV_PATH} points to non-existent path {}", pb.display()));
    }
    let toml_p = PathBuf::from("config/digest.toml");
    if toml_p.exists() {
        return Ok(toml_p);
    }
    let json_p = PathBuf::from("config/digest.json");
    if json_p.exists() {
        return Ok(json_p);
    }
    Err(anyhow!(
        "no configuration found: set {ENV_PATH} or create config/digest.toml"
    ))
}

fn parse_config(s: &str, hint_ext: &str) -> Result<Config> {
    // Try the hinted format first, then the other one.
    let json_first = hint_ext == "json" || s.trim_start().starts_with('{');
    if json_first {
        match serde_json::from_str::<Config>(s) {
            Ok(c) => Ok(c),
            Err(json_err) => toml::from_str::<Config>(s)
                .map_err(|_| anyhow!("invalid JSON config: {json_err}")),
        }
    } else {
        match toml::from_str::<Config>(s) {
            Ok(c) => Ok(c),
            Err(toml_err) => serde_json::from_str::<Config>(s)
                .map_err(|_| anyhow!("invalid TOML config: {toml_err}")),
        }
    }
}
