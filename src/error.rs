// src/error.rs
//! Error taxonomy. Fetch and summarization errors are absorbed per source / per item;
//! configuration, store and deadline errors abort the run.

use thiserror::Error;

/// One source could not be read. Never fatal to a run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("feed parse error: {0}")]
    Parse(String),

    #[error("fetch timed out after {0}s")]
    Timeout(u64),
}

/// The summarization capability failed for one item; the caller falls back to truncation.
#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("summarizer not configured")]
    Unconfigured,

    #[error("summarizer timed out after {0}ms")]
    Timeout(u64),

    #[error("summarizer http error: {0}")]
    Http(String),

    #[error("malformed summarizer response: {0}")]
    Malformed(String),
}

/// A single delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("webhook request failed: {0}")]
    Transport(String),

    #[error("webhook returned HTTP {code}")]
    Status { code: u16, retryable: bool },

    #[error("webhook rejected message: errcode={code} {message}")]
    Rejected {
        code: i64,
        message: String,
        retryable: bool,
    },

    #[error("could not encode webhook payload: {0}")]
    Encode(String),
}

impl DeliveryError {
    /// Transient failures are worth another attempt; malformed payloads and auth
    /// failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Transport(_) => true,
            DeliveryError::Status { retryable, .. } => *retryable,
            DeliveryError::Rejected { retryable, .. } => *retryable,
            DeliveryError::Encode(_) => false,
        }
    }

    /// Classify an HTTP status: 408, 429 and 5xx are transient.
    pub fn from_status(code: u16) -> Self {
        let retryable = code == 408 || code == 429 || (500..=599).contains(&code);
        DeliveryError::Status { code, retryable }
    }
}

/// Fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no sources configured")]
    NoSources,

    #[error("duplicate source name: {0}")]
    DuplicateSource(String),

    #[error("source {name}: invalid url {url:?}")]
    InvalidSourceUrl { name: String, url: String },

    #[error("source with empty name")]
    EmptySourceName,

    #[error("missing delivery webhook")]
    MissingWebhook,

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("summarizer enabled without an api key")]
    MissingApiKey,

    #[error("unsupported {field}: {value}")]
    Unsupported { field: &'static str, value: String },

    #[error("invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// Persisted dedup state could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("dedup store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("dedup store decode error at {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Run-level failures propagated to the caller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("dedup store error: {0}")]
    Store(#[from] StoreError),

    #[error("run exceeded its deadline of {0}s")]
    DeadlineExceeded(u64),
}
