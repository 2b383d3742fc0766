// src/notify/mod.rs
//! Delivery adapter: a webhook transport wrapped in a bounded immediate retry.

pub mod dingtalk;
pub mod slack;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::Serialize;

use crate::config::{DeliveryConfig, DeliveryKind};
use crate::digest::{headline, render_markdown, Digest};
use crate::error::DeliveryError;

pub use dingtalk::DingTalkTransport;
pub use slack::SlackTransport;

/// Rendered message handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookMessage {
    pub title: String,
    pub text: String,
}

impl WebhookMessage {
    pub fn from_digest(digest: &Digest, title: &str) -> Self {
        Self {
            title: headline(digest, title),
            text: render_markdown(digest, title),
        }
    }
}

/// One POST to a chat webhook. Implementations classify failures as retryable or not.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, msg: &WebhookMessage) -> Result<(), DeliveryError>;
    fn name(&self) -> &'static str;
}

/// Outcome of a delivery, after retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    pub attempts: u32,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(attempts: u32) -> Self {
        Self {
            success: true,
            attempts,
            error: None,
        }
    }

    pub fn failed(attempts: u32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            attempts,
            error: Some(error.into()),
        }
    }
}

/// What the pipeline calls to hand over a digest.
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, digest: &Digest) -> DeliveryResult;
}

/// Up to `max_attempts` tries with a fixed pause between them. Non-retryable errors
/// stop immediately.
pub struct RetryingDelivery {
    transport: Arc<dyn WebhookTransport>,
    max_attempts: u32,
    backoff: Duration,
    title: String,
}

impl RetryingDelivery {
    pub fn new(transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            transport,
            max_attempts: 2,
            backoff: Duration::from_secs(2),
            title: "AI Daily Brief".to_string(),
        }
    }

    pub fn with_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    pub async fn send_message(&self, msg: &WebhookMessage) -> DeliveryResult {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            counter!("digest_delivery_attempts_total").increment(1);

            match self.transport.send(msg).await {
                Ok(()) => {
                    tracing::info!(transport = self.transport.name(), attempt, "digest delivered");
                    return DeliveryResult::delivered(attempt);
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    tracing::warn!(
                        transport = self.transport.name(),
                        attempt,
                        retryable,
                        error = %e,
                        "delivery attempt failed"
                    );
                    if !retryable || attempt >= self.max_attempts {
                        return DeliveryResult::failed(attempt, e.to_string());
                    }
                    tokio::time::sleep(self.backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl Deliverer for RetryingDelivery {
    async fn deliver(&self, digest: &Digest) -> DeliveryResult {
        let msg = WebhookMessage::from_digest(digest, &self.title);
        self.send_message(&msg).await
    }
}

/// Transport for the configured webhook kind.
pub fn transport_for(cfg: &DeliveryConfig) -> Result<Arc<dyn WebhookTransport>, DeliveryError> {
    let timeout = Duration::from_secs(cfg.timeout_secs);
    let transport: Arc<dyn WebhookTransport> = match cfg.kind {
        DeliveryKind::Dingtalk => Arc::new(DingTalkTransport::new(
            cfg.webhook.clone(),
            cfg.secret.clone(),
            timeout,
        )?),
        DeliveryKind::Slack => Arc::new(SlackTransport::new(cfg.webhook.clone(), timeout)?),
    };
    Ok(transport)
}

/// Delivery adapter for a validated delivery section.
pub fn delivery_for(cfg: &DeliveryConfig, title: &str) -> Result<RetryingDelivery, DeliveryError> {
    Ok(RetryingDelivery::new(transport_for(cfg)?)
        .with_attempts(cfg.max_attempts)
        .with_backoff(Duration::from_millis(cfg.backoff_ms))
        .with_title(title))
}

fn http_client(timeout: Duration) -> Result<reqwest::Client, DeliveryError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DeliveryError::Transport(e.to_string()))
}
