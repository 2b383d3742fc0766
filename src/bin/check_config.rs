//! Probe a configuration: load and validate it, fetch every source once, report the
//! summarizer, and with `--send-test` post a short message through the webhook.

use std::path::PathBuf;
use std::process::ExitCode;

use ai_news_digest::ingest::fetch_all;
use ai_news_digest::ingest::providers::HttpFeedFetcher;
use ai_news_digest::notify::{self, WebhookMessage};
use ai_news_digest::relevance;
use ai_news_digest::Config;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "check_config", about = "Validate a digest configuration and probe its sources")]
struct Args {
    /// Path to the config file (TOML or JSON)
    #[arg(long, value_name = "FILE", env = "DIGEST_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Post a short test message through the configured webhook
    #[arg(long)]
    send_test: bool,
}

async fn check(path: Option<PathBuf>, send_test: bool) -> Result<bool> {
    let cfg = match path {
        Some(p) => Config::load_from(&p)?,
        None => Config::load_default()?,
    };
    let registry = cfg.registry()?;
    let settings = &cfg.settings;
    println!(
        "config ok: {} sources, delivery={:?}, max_news={}, window={}h",
        registry.len(),
        cfg.delivery.kind,
        settings.max_news,
        settings.dedup_window_hours
    );

    let fetcher = HttpFeedFetcher::new(settings.fetch_timeout(), settings.max_entries_per_source)
        .context("building feed client")?;
    let batches = fetch_all(
        &fetcher,
        &registry,
        settings.fetch_concurrency,
        settings.fetch_timeout(),
    )
    .await;

    let mut all_ok = true;
    for b in &batches {
        match &b.result {
            Ok(items) => {
                let relevant: Vec<_> = items
                    .iter()
                    .filter(|it| relevance::matches(it, &b.source))
                    .collect();
                let mut hits: Vec<&str> = relevant
                    .iter()
                    .flat_map(|it| relevance::matched_keywords(it, &b.source))
                    .collect();
                hits.sort_unstable();
                hits.dedup();
                println!(
                    "  ok   {:<28} {:>3} items, {:>3} relevant  [{}]",
                    b.source.name,
                    items.len(),
                    relevant.len(),
                    hits.join(", ")
                );
            }
            Err(e) => {
                all_ok = false;
                println!("  FAIL {:<28} {e}", b.source.name);
            }
        }
    }

    if cfg.summarizer.enabled {
        println!(
            "summarizer: {} model={} timeout={}s",
            cfg.summarizer.provider, cfg.summarizer.model, cfg.summarizer.timeout_secs
        );
    } else {
        println!(
            "summarizer: disabled (bodies truncated to {} chars)",
            cfg.summarizer.fallback_chars
        );
    }

    if send_test {
        let delivery = notify::delivery_for(&cfg.delivery, &settings.digest_title)
            .context("building webhook client")?;
        let msg = WebhookMessage {
            title: format!("{} | test", settings.digest_title),
            text: format!(
                "## {}\n\nConfiguration check: {} sources configured.",
                settings.digest_title,
                registry.len()
            ),
        };
        let res = delivery.send_message(&msg).await;
        if res.success {
            println!("test message delivered ({} attempt(s))", res.attempts);
        } else {
            all_ok = false;
            println!(
                "test message FAILED after {} attempt(s): {}",
                res.attempts,
                res.error.unwrap_or_default()
            );
        }
    }

    Ok(all_ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let args = Args::parse();

    match check(args.config, args.send_test).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("configuration error: {e:#}");
            ExitCode::from(2)
        }
    }
}
