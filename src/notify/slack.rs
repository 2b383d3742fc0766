// src/notify/slack.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{http_client, WebhookMessage, WebhookTransport};
use crate::error::DeliveryError;

/// Slack-compatible incoming webhook (`{"text": ...}`).
pub struct SlackTransport {
    webhook_url: String,
    client: Client,
}

impl SlackTransport {
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self, DeliveryError> {
        Ok(Self {
            webhook_url,
            client: http_client(timeout)?,
        })
    }
}

/// Slack mrkdwn uses single asterisks for bold.
fn to_mrkdwn(msg: &WebhookMessage) -> String {
    format!("*{}*\n{}", msg.title, msg.text.replace("**", "*"))
}

#[async_trait]
impl WebhookTransport for SlackTransport {
    async fn send(&self, msg: &WebhookMessage) -> Result<(), DeliveryError> {
        let body = serde_json::json!({ "text": to_mrkdwn(msg) });

        let rsp = self
            .client
            .post(&self.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = rsp.status();
        if !status.is_success() {
            return Err(DeliveryError::from_status(status.as_u16()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "slack"
    }
}
