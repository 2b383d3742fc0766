// src/pipeline.rs
//! One pass of fetch → filter → dedup → summarize → compose → deliver → commit.
//!
//! Fingerprints are committed only after the webhook confirmed delivery, in one batch,
//! so a failed or interrupted run is safe to retry.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use serde::Serialize;

use crate::config::Settings;
use crate::dedup::{fingerprint, DedupStore, Fingerprint};
use crate::digest::{compose, date_label, DigestItem};
use crate::error::PipelineError;
use crate::ingest::types::{RawItem, SourceFetcher};
use crate::ingest::{fetch_all, is_recent};
use crate::notify::Deliverer;
use crate::relevance;
use crate::sources::SourceRegistry;
use crate::summarize::{Summarizer, SummaryOrigin};
use crate::telemetry::ensure_metrics_described;

/// Collaborators of a run. The store is the only mutable one.
pub struct PipelineDeps<'a> {
    pub registry: &'a SourceRegistry,
    pub fetcher: &'a dyn SourceFetcher,
    pub store: &'a mut dyn DedupStore,
    pub summarizer: &'a Summarizer,
    pub deliverer: &'a dyn Deliverer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub items_fetched: usize,
    pub items_after_filter: usize,
    pub items_after_dedup: usize,
    pub digest_len: usize,
    pub summary_fallbacks: usize,
    pub delivery_attempted: bool,
    pub delivery_attempts: u32,
    pub delivered: bool,
    pub errors: Vec<String>,
}

impl RunReport {
    /// A digest was due and could not be delivered. Source errors alone are not a failure.
    pub fn is_failure(&self) -> bool {
        self.delivery_attempted && !self.delivered
    }

    fn outcome(&self) -> &'static str {
        if self.delivered {
            "delivered"
        } else if self.delivery_attempted {
            "failed"
        } else {
            "empty"
        }
    }
}

pub async fn run_once(
    deps: PipelineDeps<'_>,
    settings: &Settings,
) -> Result<RunReport, PipelineError> {
    run_once_at(deps, settings, Utc::now()).await
}

/// [`run_once`] with an explicit clock, bounded by `settings.run_deadline_secs`.
pub async fn run_once_at(
    deps: PipelineDeps<'_>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<RunReport, PipelineError> {
    settings.validate()?;
    ensure_metrics_described();

    let deadline = settings.run_deadline();
    let result = match tokio::time::timeout(deadline, run_inner(deps, settings, now)).await {
        Ok(r) => r,
        Err(_) => Err(PipelineError::DeadlineExceeded(deadline.as_secs())),
    };

    let outcome = match &result {
        Ok(report) => report.outcome(),
        Err(_) => "error",
    };
    counter!("digest_runs_total", "outcome" => outcome).increment(1);
    gauge!("digest_last_run_ts").set(Utc::now().timestamp() as f64);

    match &result {
        Ok(report) if report.is_failure() => {
            tracing::error!(errors = ?report.errors, "digest run failed: delivery unsuccessful")
        }
        Ok(report) => tracing::info!(
            fetched = report.items_fetched,
            after_filter = report.items_after_filter,
            after_dedup = report.items_after_dedup,
            delivered = report.delivered,
            digest_len = report.digest_len,
            source_errors = report.errors.len(),
            "digest run finished"
        ),
        Err(e) => tracing::error!(error = %e, "digest run aborted"),
    }
    result
}

async fn run_inner(
    deps: PipelineDeps<'_>,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<RunReport, PipelineError> {
    let PipelineDeps {
        registry,
        fetcher,
        store,
        summarizer,
        deliverer,
    } = deps;
    let mut report = RunReport::default();

    // 1) Fetch + filter, per source
    let batches = fetch_all(
        fetcher,
        registry,
        settings.fetch_concurrency,
        settings.fetch_timeout(),
    )
    .await;

    let max_age = settings.max_item_age();
    let mut relevant: Vec<(RawItem, crate::sources::Category)> = Vec::new();
    for batch in batches {
        let items = match batch.result {
            Ok(items) => items,
            Err(e) => {
                report.errors.push(format!("source {}: {e}", batch.source.name));
                continue;
            }
        };
        report.items_fetched += items.len();
        for item in items {
            if is_recent(&item, now, max_age) && relevance::matches(&item, &batch.source) {
                relevant.push((item, batch.source.category));
            }
        }
    }
    report.items_after_filter = relevant.len();
    counter!("digest_items_fetched_total").increment(report.items_fetched as u64);
    counter!("digest_items_filtered_total")
        .increment((report.items_fetched - report.items_after_filter) as u64);

    // 2) Dedup against the store and within this run
    let mut run_seen: HashSet<Fingerprint> = HashSet::new();
    let mut raw_by_fp: HashMap<Fingerprint, RawItem> = HashMap::new();
    let mut candidates: Vec<DigestItem> = Vec::new();
    for (item, category) in relevant {
        let fp = fingerprint(&item.link, &item.title);
        if store.is_seen(&fp, now) || !run_seen.insert(fp.clone()) {
            continue;
        }
        candidates.push(DigestItem {
            title: item.title.clone(),
            summary: String::new(),
            link: item.link.clone(),
            source_name: item.source_name.clone(),
            category,
            published_at: item.published_at,
            fingerprint: fp.clone(),
        });
        raw_by_fp.insert(fp, item);
    }
    report.items_after_dedup = candidates.len();
    counter!("digest_items_deduped_total")
        .increment((report.items_after_filter - report.items_after_dedup) as u64);

    // 3) Select, then summarize only what made the cut
    let label = date_label(now, settings.utc_offset_hours);
    let mut digest = compose(candidates, settings.max_news, label, now);

    let selected: Vec<RawItem> = digest
        .items
        .iter()
        .filter_map(|it| raw_by_fp.remove(&it.fingerprint))
        .collect();
    let summaries = summarizer.summarize_all(selected).await;
    for (it, (_, summary)) in digest.items.iter_mut().zip(summaries) {
        if summary.origin == SummaryOrigin::Fallback {
            report.summary_fallbacks += 1;
        }
        it.summary = summary.text;
    }
    report.digest_len = digest.len();

    if digest.is_empty() && settings.suppress_empty {
        tracing::info!("no new items, skipping delivery");
        return Ok(report);
    }

    // 4) Deliver, then commit
    report.delivery_attempted = true;
    let result = deliverer.deliver(&digest).await;
    report.delivery_attempts = result.attempts;
    if !result.success {
        let err = result.error.unwrap_or_else(|| "unknown delivery error".into());
        report.errors.push(format!("delivery: {err}"));
        return Ok(report);
    }
    report.delivered = true;

    let fps: BTreeSet<Fingerprint> = digest
        .items
        .iter()
        .map(|it| it.fingerprint.clone())
        .collect();
    if let Err(e) = store.mark_seen(&fps, now) {
        tracing::error!(error = %e, items = fps.len(),
            "digest delivered but seen state not saved; items may repeat next run");
        return Err(e.into());
    }
    match store.compact(now) {
        Ok(0) => {}
        Ok(n) => tracing::debug!(removed = n, "dedup store compacted"),
        Err(e) => tracing::warn!(error = %e, "dedup compaction failed"),
    }

    Ok(report)
}
