// src/ingest/mod.rs
pub mod providers;
pub mod types;

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::counter;

use crate::error::FetchError;
use crate::ingest::types::{RawItem, SourceFetcher};
use crate::sources::{Source, SourceRegistry};

/// Hard cap on normalized body length; summaries only ever need the head of an article.
pub const MAX_BODY_CHARS: usize = 4000;

/// Normalize feed text: decode entities, strip tags, straighten quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_BODY_CHARS {
        out = out.chars().take(MAX_BODY_CHARS).collect();
    }

    out
}

/// Result of fetching one source.
#[derive(Debug)]
pub struct SourceBatch {
    pub source: Source,
    pub result: Result<Vec<RawItem>, FetchError>,
}

/// Fetch every registered source with at most `concurrency` requests in flight.
///
/// Each call is bounded by `timeout`. Requests complete in any order; the returned
/// batches are in registry order.
pub async fn fetch_all(
    fetcher: &dyn SourceFetcher,
    registry: &SourceRegistry,
    concurrency: usize,
    timeout: Duration,
) -> Vec<SourceBatch> {
    let sources = registry.sources().iter().cloned().enumerate();

    let mut batches: Vec<(usize, SourceBatch)> = stream::iter(sources)
        .map(|(pos, source)| async move {
            let t0 = std::time::Instant::now();
            let result = match tokio::time::timeout(timeout, fetcher.fetch(&source)).await {
                Ok(r) => r,
                Err(_) => Err(FetchError::Timeout(timeout.as_secs())),
            };
            match &result {
                Ok(items) => tracing::info!(
                    source = %source.name,
                    fetcher = fetcher.name(),
                    items = items.len(),
                    ms = t0.elapsed().as_millis() as u64,
                    "fetched source"
                ),
                Err(e) => {
                    tracing::warn!(source = %source.name, error = %e, "source fetch failed");
                    counter!("digest_source_errors_total").increment(1);
                }
            }
            (pos, SourceBatch { source, result })
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;
    batches.sort_by_key(|(pos, _)| *pos);
    batches.into_iter().map(|(_, b)| b).collect()
}

/// True when the item is not older than `max_age` relative to `now`. `None` disables the cutoff.
pub fn is_recent(item: &RawItem, now: DateTime<Utc>, max_age: Option<chrono::Duration>) -> bool {
    match max_age {
        None => true,
        Some(age) => item.published_at >= now - age,
    }
}
