// src/notify/dingtalk.rs
//! DingTalk custom-robot webhook: markdown message, optional HMAC-signed URL.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::Deserialize;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;

use super::{http_client, WebhookMessage, WebhookTransport};
use crate::error::DeliveryError;

/// errcode DingTalk answers with when the robot is sending too fast.
pub const ERRCODE_RATE_LIMITED: i64 = 130101;

pub struct DingTalkTransport {
    webhook: String,
    secret: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct RobotResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

impl DingTalkTransport {
    pub fn new(
        webhook: String,
        secret: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        Ok(Self {
            webhook,
            secret: secret.filter(|s| !s.is_empty()),
            client: http_client(timeout)?,
        })
    }

    /// Webhook URL with `timestamp` and `sign` appended when a secret is set.
    pub fn signed_url(&self, now_ms: i64) -> Result<String, DeliveryError> {
        let Some(secret) = &self.secret else {
            return Ok(self.webhook.clone());
        };
        let mut url = Url::parse(&self.webhook)
            .map_err(|e| DeliveryError::Encode(format!("webhook url: {e}")))?;
        let ts = now_ms.to_string();
        let sig = sign(secret, now_ms)?;
        url.query_pairs_mut()
            .append_pair("timestamp", &ts)
            .append_pair("sign", &sig);
        Ok(url.into())
    }
}

/// `base64(HMAC-SHA256(secret, "{timestamp}\n{secret}"))`.
pub fn sign(secret: &str, now_ms: i64) -> Result<String, DeliveryError> {
    let payload = format!("{now_ms}\n{secret}");
    let mac = hmac_sha256(secret.as_bytes(), payload.as_bytes())?;
    Ok(base64::engine::general_purpose::STANDARD.encode(mac))
}

/// RFC 2104 HMAC over SHA-256.
pub fn hmac_sha256(key: &[u8], msg: &[u8]) -> Result<[u8; 32], DeliveryError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| DeliveryError::Encode(format!("signing key: {e}")))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().into())
}

#[async_trait]
impl WebhookTransport for DingTalkTransport {
    async fn send(&self, msg: &WebhookMessage) -> Result<(), DeliveryError> {
        let url = self.signed_url(chrono::Utc::now().timestamp_millis())?;
        let body = serde_json::json!({
            "msgtype": "markdown",
            "markdown": { "title": msg.title, "text": msg.text },
        });

        let rsp = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = rsp.status();
        if !status.is_success() {
            return Err(DeliveryError::from_status(status.as_u16()));
        }

        let parsed: RobotResponse = rsp.json().await.map_err(|e| DeliveryError::Rejected {
            code: -1,
            message: format!("unreadable response: {e}"),
            retryable: false,
        })?;
        check_errcode(parsed.errcode, parsed.errmsg)
    }

    fn name(&self) -> &'static str {
        "dingtalk"
    }
}

fn check_errcode(errcode: i64, errmsg: String) -> Result<(), DeliveryError> {
    if errcode == 0 {
        return Ok(());
    }
    Err(DeliveryError::Rejected {
        code: errcode,
        message: errmsg,
        retryable: errcode == ERRCODE_RATE_LIMITED,
    })
}
