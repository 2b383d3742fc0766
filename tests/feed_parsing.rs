// tests/feed_parsing.rs
use std::time::Duration;

use ai_news_digest::error::FetchError;
use ai_news_digest::ingest::fetch_all;
use ai_news_digest::ingest::providers::rss::parse_feed;
use ai_news_digest::ingest::providers::FixtureFetcher;
use ai_news_digest::sources::{Category, Source, SourceRegistry};
use chrono::{TimeZone, Utc};

const TC_XML: &str = include_str!("fixtures/techcrunch_rss.xml");
const KR_XML: &str = include_str!("fixtures/36kr_atom.xml");

#[test]
fn rss_fixture_is_normalized() {
    let now = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap();
    let items = parse_feed(TC_XML, "TechCrunch", 50, now).unwrap();
    assert_eq!(items.len(), 3);

    let first = &items[0];
    assert_eq!(
        first.title,
        "Robotics startup raises $120M Series B to build world models"
    );
    assert_eq!(
        first.link,
        "https://techcrunch.com/2025/03/04/robotics-world-models/?utm_source=rss&utm_medium=feed"
    );
    assert_eq!(
        first.body,
        "The company's world model platform trains robots in simulation. Investors include two GPU cloud providers."
    );
    assert_eq!(
        first.published_at,
        Utc.with_ymd_and_hms(2025, 3, 4, 7, 15, 0).unwrap()
    );
    assert_eq!(first.source_name, "TechCrunch");
    assert!(items[2].body.contains("$1B & more"));
}

#[test]
fn atom_fixture_picks_alternate_link() {
    let now = Utc.with_ymd_and_hms(2025, 3, 4, 9, 0, 0).unwrap();
    let items = parse_feed(KR_XML, "36Kr", 50, now).unwrap();
    assert_eq!(items.len(), 2);

    assert_eq!(items[0].title, "某大模型公司完成新一轮融资");
    assert_eq!(items[0].link, "https://36kr.com/p/101");
    assert_eq!(items[0].body, "本轮融资将用于 算力 建设。");
    assert_eq!(
        items[0].published_at,
        Utc.with_ymd_and_hms(2025, 3, 4, 1, 30, 0).unwrap()
    );

    // no `published`, falls back to `updated`; body from `content`
    assert_eq!(items[1].link, "https://36kr.com/p/102");
    assert_eq!(items[1].body, "二月销量同比增长。");
    assert_eq!(
        items[1].published_at,
        Utc.with_ymd_and_hms(2025, 3, 3, 23, 0, 0).unwrap()
    );
}

#[test]
fn entry_cap_applies_per_feed() {
    let items = parse_feed(TC_XML, "TechCrunch", 1, Utc::now()).unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn one_failing_source_does_not_affect_others() {
    let registry = SourceRegistry::new(vec![
        Source::new("TechCrunch", "https://techcrunch.com/feed/", Category::Funding),
        Source::new("36Kr", "https://36kr.com/feed", Category::ChineseMedia),
        Source::new("Down", "https://down.test/rss", Category::Other),
    ])
    .unwrap();
    let fetcher = FixtureFetcher::new()
        .with_xml("TechCrunch", TC_XML)
        .with_xml("36Kr", KR_XML)
        .with_failure("Down", 503);

    let mut batches = fetch_all(&fetcher, &registry, 2, Duration::from_secs(5)).await;
    batches.sort_by(|a, b| a.source.name.cmp(&b.source.name));

    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].source.name, "36Kr");
    assert_eq!(batches[0].result.as_ref().unwrap().len(), 2);
    assert!(matches!(batches[1].result, Err(FetchError::Status(503))));
    assert_eq!(batches[2].result.as_ref().unwrap().len(), 3);
}
