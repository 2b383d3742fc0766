// tests/pipeline_e2e.rs
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ai_news_digest::config::Settings;
use ai_news_digest::dedup::{fingerprint, DedupStore, FileDedupStore, MemoryDedupStore};
use ai_news_digest::error::{DeliveryError, FetchError, PipelineError};
use ai_news_digest::ingest::providers::FixtureFetcher;
use ai_news_digest::ingest::types::{RawItem, SourceFetcher};
use ai_news_digest::notify::{RetryingDelivery, WebhookMessage, WebhookTransport};
use ai_news_digest::pipeline::{run_once_at, PipelineDeps};
use ai_news_digest::sources::{Category, Source, SourceRegistry};
use ai_news_digest::summarize::Summarizer;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};

const TC_XML: &str = include_str!("fixtures/techcrunch_rss.xml");

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 4, 1, 30, 0).unwrap()
}

fn raw(source: &str, title: &str, link: &str, hours_ago: i64) -> RawItem {
    RawItem {
        title: title.into(),
        body: format!("{title}: details about the AI model."),
        link: link.into(),
        published_at: now() - ChronoDuration::hours(hours_ago),
        source_name: source.into(),
    }
}

fn settings() -> Settings {
    Settings {
        max_news: 10,
        ..Settings::default()
    }
}

#[derive(Default)]
struct ScriptedTransport {
    script: Mutex<VecDeque<DeliveryError>>,
    calls: AtomicU32,
    sent: Mutex<Vec<WebhookMessage>>,
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn send(&self, msg: &WebhookMessage) -> Result<(), DeliveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.script.lock().unwrap().pop_front() {
            return Err(e);
        }
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn delivery(t: &Arc<ScriptedTransport>) -> RetryingDelivery {
    RetryingDelivery::new(t.clone()).with_backoff(Duration::ZERO)
}

fn two_sources() -> SourceRegistry {
    SourceRegistry::new(vec![
        Source::new("TechCrunch", "https://techcrunch.com/feed/", Category::Funding)
            .with_keywords(["AI", "model"]),
        Source::new("Broken", "https://broken.test/rss", Category::InternationalMedia),
    ])
    .unwrap()
}

#[tokio::test]
async fn scenario_a_failed_source_is_reported_and_run_delivers() {
    let registry = two_sources();
    let fetcher = FixtureFetcher::new()
        .with_items(
            "TechCrunch",
            vec![
                raw("TechCrunch", "AI lab one", "https://tc.test/1", 1),
                raw("TechCrunch", "AI lab two", "https://tc.test/2", 2),
                raw("TechCrunch", "AI lab three", "https://tc.test/3", 3),
            ],
        )
        .with_failure("Broken", 500);
    let mut store = MemoryDedupStore::new(ChronoDuration::hours(24));
    let summarizer = Summarizer::disabled();
    let transport = Arc::new(ScriptedTransport::default());
    let deliverer = delivery(&transport);

    let report = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &fetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings(),
        now(),
    )
    .await
    .unwrap();

    assert_eq!(report.items_fetched, 3);
    assert_eq!(report.items_after_filter, 3);
    assert_eq!(report.items_after_dedup, 3);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("Broken"), "{:?}", report.errors);
    assert!(report.delivered);
    assert!(!report.is_failure());
    assert_eq!(report.delivery_attempts, 1);
    assert_eq!(report.summary_fallbacks, 3);

    assert_eq!(store.len(), 3);
    assert!(store.is_seen(&fingerprint("https://tc.test/1", ""), now()));

    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    // newest first within the category
    let text = &sent[0].text;
    assert!(text.find("AI lab one").unwrap() < text.find("AI lab three").unwrap());
}

#[tokio::test]
async fn scenario_b_second_run_with_same_link_sends_nothing() {
    let registry = SourceRegistry::new(vec![Source::new(
        "TechCrunch",
        "https://techcrunch.com/feed/",
        Category::Funding,
    )])
    .unwrap();
    let fetcher = FixtureFetcher::new().with_items(
        "TechCrunch",
        vec![raw("TechCrunch", "Only story", "https://tc.test/only", 1)],
    );
    let mut store = MemoryDedupStore::new(ChronoDuration::hours(24));
    let summarizer = Summarizer::disabled();
    let transport = Arc::new(ScriptedTransport::default());
    let deliverer = delivery(&transport);

    let first = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &fetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings(),
        now(),
    )
    .await
    .unwrap();
    assert!(first.delivered);
    assert_eq!(first.digest_len, 1);

    let second = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &fetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings(),
        now() + ChronoDuration::hours(6),
    )
    .await
    .unwrap();
    assert_eq!(second.items_fetched, 1);
    assert_eq!(second.items_after_dedup, 0);
    assert!(!second.delivery_attempted);
    assert!(!second.delivered);
    assert!(!second.is_failure());
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn scenario_c_failed_delivery_commits_nothing() {
    let registry = two_sources();
    let fetcher = FixtureFetcher::new()
        .with_items(
            "TechCrunch",
            vec![raw("TechCrunch", "AI lab one", "https://tc.test/1", 1)],
        )
        .with_items(
            "Broken",
            vec![raw("Broken", "World model paper", "https://b.test/1", 1)],
        );
    let dir = tempfile::tempdir().unwrap();
    let state = dir.path().join("seen_items.json");
    let mut store = FileDedupStore::open(&state, ChronoDuration::hours(24)).unwrap();
    let summarizer = Summarizer::disabled();
    let transport = Arc::new(ScriptedTransport {
        script: Mutex::new(
            vec![
                DeliveryError::from_status(502),
                DeliveryError::from_status(504),
            ]
            .into(),
        ),
        ..Default::default()
    });
    let deliverer = delivery(&transport);

    let report = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &fetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings(),
        now(),
    )
    .await
    .unwrap();

    assert!(!report.delivered);
    assert!(report.is_failure());
    assert_eq!(report.delivery_attempts, 2);
    assert_eq!(report.digest_len, 2);
    assert!(report.errors.iter().any(|e| e.starts_with("delivery:")));
    assert!(store.is_empty());
    assert!(!state.exists());

    // a later successful run picks the same items up again
    let reopened = FileDedupStore::open(&state, ChronoDuration::hours(24)).unwrap();
    assert!(reopened.is_empty());
}

#[tokio::test]
async fn filters_keywords_and_age_and_caps_the_digest() {
    let registry = SourceRegistry::new(vec![Source::new(
        "TechCrunch",
        "https://techcrunch.com/feed/",
        Category::Funding,
    )
    .with_keywords(["world model", "funding"])])
    .unwrap();
    let fetcher = FixtureFetcher::new().with_xml("TechCrunch", TC_XML);
    let mut store = MemoryDedupStore::new(ChronoDuration::hours(24));
    let summarizer = Summarizer::disabled();
    let transport = Arc::new(ScriptedTransport::default());
    let deliverer = delivery(&transport);
    let run_at = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap();
    let settings = Settings {
        max_news: 1,
        ..Settings::default()
    };

    let report = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &fetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings,
        run_at,
    )
    .await
    .unwrap();

    // phone results do not match any keyword
    assert_eq!(report.items_fetched, 3);
    assert_eq!(report.items_after_filter, 2);
    assert_eq!(report.items_after_dedup, 2);
    assert_eq!(report.digest_len, 1);
    assert!(report.delivered);

    // only the delivered (newest) item is marked; the capped one stays eligible
    assert_eq!(store.len(), 1);
    assert!(store.is_seen(
        &fingerprint("https://techcrunch.com/2025/03/04/robotics-world-models/", ""),
        run_at
    ));
    assert!(!store.is_seen(
        &fingerprint("https://techcrunch.com/2025/03/03/data-labeling-funding/", ""),
        run_at
    ));
}

#[tokio::test]
async fn stale_items_are_dropped_before_filtering() {
    let registry = SourceRegistry::new(vec![Source::new(
        "TechCrunch",
        "https://techcrunch.com/feed/",
        Category::Funding,
    )])
    .unwrap();
    let fetcher = FixtureFetcher::new().with_items(
        "TechCrunch",
        vec![
            raw("TechCrunch", "Fresh", "https://tc.test/fresh", 2),
            raw("TechCrunch", "Stale", "https://tc.test/stale", 30),
        ],
    );
    let mut store = MemoryDedupStore::new(ChronoDuration::hours(24));
    let summarizer = Summarizer::disabled();
    let transport = Arc::new(ScriptedTransport::default());
    let deliverer = delivery(&transport);

    let report = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &fetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings(),
        now(),
    )
    .await
    .unwrap();

    assert_eq!(report.items_fetched, 2);
    assert_eq!(report.items_after_filter, 1);
    assert!(report.errors.is_empty());
    assert_eq!(report.digest_len, 1);
}

/// Hangs on every fetch.
struct HangingFetcher;

#[async_trait]
impl SourceFetcher for HangingFetcher {
    async fn fetch(&self, _source: &Source) -> Result<Vec<RawItem>, FetchError> {
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        Ok(Vec::new())
    }
    fn name(&self) -> &'static str {
        "hanging"
    }
}

#[tokio::test(start_paused = true)]
async fn run_past_deadline_fails_loudly() {
    let registry = two_sources();
    let mut store = MemoryDedupStore::new(ChronoDuration::hours(24));
    let summarizer = Summarizer::disabled();
    let transport = Arc::new(ScriptedTransport::default());
    let deliverer = delivery(&transport);
    let settings = Settings {
        fetch_timeout_secs: 3600,
        run_deadline_secs: 5,
        ..Settings::default()
    };

    let err = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &HangingFetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings,
        now(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, PipelineError::DeadlineExceeded(5)));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn invalid_settings_are_a_config_error() {
    let registry = two_sources();
    let fetcher = FixtureFetcher::new();
    let mut store = MemoryDedupStore::new(ChronoDuration::hours(24));
    let summarizer = Summarizer::disabled();
    let transport = Arc::new(ScriptedTransport::default());
    let deliverer = delivery(&transport);
    let settings = Settings {
        max_news: 0,
        ..Settings::default()
    };

    let err = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &fetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings,
        now(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

/// Serves canned items after a per-source delay.
struct DelayedFetcher {
    inner: FixtureFetcher,
    delays: HashMap<String, Duration>,
}

#[async_trait]
impl SourceFetcher for DelayedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, FetchError> {
        if let Some(d) = self.delays.get(&source.name) {
            tokio::time::sleep(*d).await;
        }
        self.inner.fetch(source).await
    }
    fn name(&self) -> &'static str {
        "delayed"
    }
}

#[tokio::test(start_paused = true)]
async fn cross_posted_item_keeps_first_registered_source() {
    let registry = SourceRegistry::new(vec![
        Source::new("VC Wire", "https://vc.test/rss", Category::Funding),
        Source::new("Global", "https://global.test/rss", Category::InternationalMedia),
    ])
    .unwrap();
    let link = "https://news.test/robot-startup";
    let settings = Settings {
        max_news: 10,
        fetch_timeout_secs: 60,
        ..Settings::default()
    };

    for (vc_delay, global_delay) in [(3, 0), (0, 3)] {
        let fetcher = DelayedFetcher {
            inner: FixtureFetcher::new()
                .with_items("VC Wire", vec![raw("VC Wire", "Robot startup raises", link, 1)])
                .with_items("Global", vec![raw("Global", "Robot startup raises", link, 1)]),
            delays: HashMap::from([
                ("VC Wire".to_string(), Duration::from_secs(vc_delay)),
                ("Global".to_string(), Duration::from_secs(global_delay)),
            ]),
        };
        let mut store = MemoryDedupStore::new(ChronoDuration::hours(24));
        let summarizer = Summarizer::disabled();
        let transport = Arc::new(ScriptedTransport::default());
        let deliverer = delivery(&transport);

        let report = run_once_at(
            PipelineDeps {
                registry: &registry,
                fetcher: &fetcher,
                store: &mut store,
                summarizer: &summarizer,
                deliverer: &deliverer,
            },
            &settings,
            now(),
        )
        .await
        .unwrap();

        assert_eq!(report.items_after_filter, 2);
        assert_eq!(report.items_after_dedup, 1);
        let sent = transport.sent.lock().unwrap();
        let text = &sent[0].text;
        assert!(text.contains("📍 **VC Wire**"), "delays {vc_delay}/{global_delay}: {text}");
        assert!(!text.contains("📍 **Global**"));
        let heading = format!("{} **Robot startup raises**", Category::Funding.emoji());
        assert!(text.contains(&heading));
    }
}

#[tokio::test]
async fn empty_digest_is_delivered_when_not_suppressed() {
    let registry = SourceRegistry::new(vec![Source::new(
        "TechCrunch",
        "https://techcrunch.com/feed/",
        Category::Funding,
    )])
    .unwrap();
    let fetcher = FixtureFetcher::new().with_items("TechCrunch", Vec::new());
    let mut store = MemoryDedupStore::new(ChronoDuration::hours(24));
    let summarizer = Summarizer::disabled();
    let transport = Arc::new(ScriptedTransport::default());
    let deliverer = delivery(&transport);
    let settings = Settings {
        suppress_empty: false,
        ..Settings::default()
    };

    let report = run_once_at(
        PipelineDeps {
            registry: &registry,
            fetcher: &fetcher,
            store: &mut store,
            summarizer: &summarizer,
            deliverer: &deliverer,
        },
        &settings,
        now(),
    )
    .await
    .unwrap();

    assert_eq!(report.digest_len, 0);
    assert!(report.delivery_attempted);
    assert!(report.delivered);
    assert!(store.is_empty());
    let sent = transport.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains("0 stories today"));
}
