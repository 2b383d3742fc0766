// src/telemetry.rs
//! Logging and metrics setup shared by the binaries.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "ai_news_digest=info,warn";

/// Register metric descriptions once per process.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_items_fetched_total", "Items read from all feeds.");
        describe_counter!(
            "digest_items_filtered_total",
            "Items dropped by the keyword filter or the recency cutoff."
        );
        describe_counter!(
            "digest_items_deduped_total",
            "Items dropped because they were delivered within the dedup window."
        );
        describe_counter!("digest_source_errors_total", "Failed source fetches.");
        describe_counter!(
            "digest_summary_fallbacks_total",
            "Items summarized by truncation instead of the model."
        );
        describe_counter!(
            "digest_delivery_attempts_total",
            "Webhook delivery attempts, including retries."
        );
        describe_counter!("digest_runs_total", "Pipeline runs by outcome.");
        describe_histogram!("digest_feed_parse_ms", "Feed parse time in milliseconds.");
        describe_gauge!(
            "digest_last_run_ts",
            "Unix timestamp of the last finished pipeline run."
        );
    });
}

/// Install the global subscriber. `RUST_LOG` overrides the filter; `LOG_FORMAT=json`
/// switches to JSON lines.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let res = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
    if let Err(e) = res {
        eprintln!("tracing already initialised: {e}");
    }
}
