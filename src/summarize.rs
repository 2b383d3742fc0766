// src/summarize.rs
//! Summarizer: one bounded call to an LLM capability per item, with a deterministic
//! truncation of the item body whenever that call does not produce a usable summary.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::config::SummarizerConfig;
use crate::error::SummarizationError;
use crate::ingest::types::RawItem;

/// Appended to truncated fallback text.
pub const ELLIPSIS: &str = "...";
pub const DEFAULT_FALLBACK_CHARS: usize = 250;
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub type SummaryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, SummarizationError>> + Send + 'a>>;

/// External text-generation capability. Output is not deterministic.
pub trait SummaryProvider: Send + Sync {
    fn summarize<'a>(&'a self, title: &'a str, body: &'a str) -> SummaryFuture<'a>;
    fn name(&self) -> &'static str;
}

/// Where a summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryOrigin {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub text: String,
    pub origin: SummaryOrigin,
}

/// First `cap` characters of `text` plus [`ELLIPSIS`], or `text` unchanged when it fits.
pub fn fallback_summary(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        return text.to_string();
    }
    let mut out: String = text.chars().take(cap).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Single line, collapsed whitespace, at most `max_chars` characters.
pub fn sanitize_summary(input: &str, max_chars: usize) -> String {
    let collapsed = input
        .trim()
        .trim_matches('"')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.chars().count() > max_chars {
        fallback_summary(&collapsed, max_chars)
    } else {
        collapsed
    }
}

pub struct Summarizer {
    provider: Arc<dyn SummaryProvider>,
    timeout: Duration,
    fallback_chars: usize,
    max_summary_chars: usize,
    concurrency: usize,
}

impl Summarizer {
    pub fn new(provider: Arc<dyn SummaryProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            fallback_chars: DEFAULT_FALLBACK_CHARS,
            max_summary_chars: 400,
            concurrency: 3,
        }
    }

    /// Build from the `[summarizer]` section. A disabled section yields [`Summarizer::disabled`]
    /// with the configured fallback cap.
    pub fn from_config(cfg: &SummarizerConfig) -> Result<Self, SummarizationError> {
        let provider: Arc<dyn SummaryProvider> = if cfg.enabled {
            Arc::new(OpenAiProvider::new(
                cfg.api_key.clone(),
                Some(&cfg.model),
                cfg.endpoint.as_deref(),
                cfg.max_summary_chars,
            )?)
        } else {
            Arc::new(DisabledProvider)
        };
        Ok(Self::new(provider, Duration::from_secs(cfg.timeout_secs.max(1)))
            .with_fallback_chars(cfg.fallback_chars)
            .with_max_summary_chars(cfg.max_summary_chars)
            .with_concurrency(cfg.concurrency))
    }

    /// Summarizer that always takes the fallback path.
    pub fn disabled() -> Self {
        Self::new(Arc::new(DisabledProvider), Duration::from_secs(1))
    }

    pub fn with_fallback_chars(mut self, cap: usize) -> Self {
        self.fallback_chars = cap;
        self
    }

    pub fn with_max_summary_chars(mut self, max: usize) -> Self {
        self.max_summary_chars = max.max(1);
        self
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Text the fallback truncates: the body, or the title for body-less items.
    fn fallback_for(&self, item: &RawItem) -> String {
        let base = if item.body.trim().is_empty() {
            &item.title
        } else {
            &item.body
        };
        fallback_summary(base, self.fallback_chars)
    }

    async fn try_model(&self, item: &RawItem) -> Result<String, SummarizationError> {
        let call = self.provider.summarize(&item.title, &item.body);
        let raw = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| SummarizationError::Timeout(self.timeout.as_millis() as u64))??;
        let text = sanitize_summary(&raw, self.max_summary_chars);
        if text.is_empty() {
            return Err(SummarizationError::Malformed("empty summary".into()));
        }
        Ok(text)
    }

    /// Exactly one attempt at the capability; never fails.
    pub async fn summarize(&self, item: &RawItem) -> Summary {
        match self.try_model(item).await {
            Ok(text) => Summary {
                text,
                origin: SummaryOrigin::Model,
            },
            Err(e) => {
                if !matches!(e, SummarizationError::Unconfigured) {
                    tracing::warn!(link = %item.link, source = %item.source_name, error = %e,
                        "summarization failed, using truncated text");
                }
                counter!("digest_summary_fallbacks_total").increment(1);
                Summary {
                    text: self.fallback_for(item),
                    origin: SummaryOrigin::Fallback,
                }
            }
        }
    }

    /// Summarize `items` with a bounded number of calls in flight. Output keeps input order.
    pub async fn summarize_all(&self, items: Vec<RawItem>) -> Vec<(RawItem, Summary)> {
        stream::iter(items)
            .map(|item| async move {
                let summary = self.summarize(&item).await;
                (item, summary)
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}

// ------------------------------------------------------------
// Providers
// ------------------------------------------------------------

/// Used when no API key is configured.
pub struct DisabledProvider;

impl SummaryProvider for DisabledProvider {
    fn summarize<'a>(&'a self, _title: &'a str, _body: &'a str) -> SummaryFuture<'a> {
        Box::pin(async { Err(SummarizationError::Unconfigured) })
    }
    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Returns a fixed text; for tests and local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl SummaryProvider for MockProvider {
    fn summarize<'a>(&'a self, _title: &'a str, _body: &'a str) -> SummaryFuture<'a> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// OpenAI-compatible chat completions endpoint.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    max_chars: usize,
}

impl OpenAiProvider {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        endpoint: Option<&str>,
        max_chars: usize,
    ) -> Result<Self, SummarizationError> {
        let http = reqwest::Client::builder()
            .user_agent("ai-news-digest/0.1")
            .connect_timeout(Duration::from_secs(4))
            .build()
            .map_err(|e| SummarizationError::Http(e.to_string()))?;
        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            endpoint: endpoint.unwrap_or(DEFAULT_OPENAI_ENDPOINT).to_string(),
            max_chars,
        })
    }
}

impl SummaryProvider for OpenAiProvider {
    fn summarize<'a>(&'a self, title: &'a str, body: &'a str) -> SummaryFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(SummarizationError::Unconfigured);
            }

            #[derive(Serialize)]
            struct Msg<'a> {
                role: &'a str,
                content: &'a str,
            }
            #[derive(Serialize)]
            struct Req<'a> {
                model: &'a str,
                messages: Vec<Msg<'a>>,
                temperature: f32,
                max_tokens: u32,
            }
            #[derive(Deserialize)]
            struct Resp {
                choices: Vec<Choice>,
            }
            #[derive(Deserialize)]
            struct Choice {
                message: ChoiceMsg,
            }
            #[derive(Deserialize)]
            struct ChoiceMsg {
                content: String,
            }

            let sys = format!(
                "You write one-paragraph news digests. Summarize the article in at most {} characters, \
                 in the article's own language, neutral tone, no emojis, no preamble. Output only the summary.",
                self.max_chars
            );
            let user = format!("Title: {title}\n\n{body}");
            let req = Req {
                model: &self.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: &sys,
                    },
                    Msg {
                        role: "user",
                        content: &user,
                    },
                ],
                temperature: 0.2,
                max_tokens: 300,
            };

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .map_err(|e| SummarizationError::Http(e.to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(SummarizationError::Http(format!("status {status}")));
            }
            let body: Resp = resp
                .json()
                .await
                .map_err(|e| SummarizationError::Malformed(e.to_string()))?;
            body.choices
                .into_iter()
                .next()
                .map(|c| c.message.content)
                .ok_or_else(|| SummarizationError::Malformed("no choices".into()))
        })
    }
    fn name(&self) -> &'static str {
        "openai"
    }
}
