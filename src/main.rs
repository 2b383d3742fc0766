//! Scheduled digest run: one pipeline pass per invocation, driven by an external
//! scheduler (cron, CI). Exit code 1 when delivery failed, 2 when the run aborted.

use std::process::ExitCode;

use ai_news_digest::dedup::FileDedupStore;
use ai_news_digest::ingest::providers::HttpFeedFetcher;
use ai_news_digest::summarize::Summarizer;
use ai_news_digest::{notify, run_once, telemetry, Config, PipelineDeps, RunReport};
use anyhow::{Context, Result};

async fn run() -> Result<RunReport> {
    let cfg = Config::load_default()?;
    let registry = cfg.registry()?;
    let settings = &cfg.settings;

    let fetcher = HttpFeedFetcher::new(settings.fetch_timeout(), settings.max_entries_per_source)
        .context("building feed client")?;
    let mut store = FileDedupStore::open(&settings.state_path, settings.dedup_window())?;
    let summarizer = Summarizer::from_config(&cfg.summarizer).context("building summarizer")?;
    let deliverer = notify::delivery_for(&cfg.delivery, &settings.digest_title)
        .context("building webhook client")?;

    tracing::info!(
        sources = registry.len(),
        summarizer = summarizer.provider_name(),
        transport = deliverer.transport_name(),
        state = %settings.state_path.display(),
        "starting digest run"
    );

    let deps = PipelineDeps {
        registry: &registry,
        fetcher: &fetcher,
        store: &mut store,
        summarizer: &summarizer,
        deliverer: &deliverer,
    };
    Ok(run_once(deps, settings).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local runs; no-op when absent.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    match run().await {
        Ok(report) if report.is_failure() => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "digest run aborted");
            ExitCode::from(2)
        }
    }
}
