// src/ingest/providers/rss.rs
//! HTTP feed fetcher for RSS 2.0, RSS 1.0 (RDF) and Atom documents.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::error::FetchError;
use crate::ingest::normalize_text;
use crate::ingest::types::{RawItem, SourceFetcher};
use crate::sources::Source;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) ai-news-digest/0.1";

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "date", alias = "dc:date")]
    dc_date: Option<String>,
    description: Option<String>,
}

impl RssItem {
    fn into_entry(self) -> Entry {
        let date = self.pub_date.or(self.dc_date);
        (self.title, self.description, self.link, date)
    }
}

// ---- RSS 1.0 (RDF): items are siblings of <channel> ----

#[derive(Debug, Deserialize)]
struct RdfFeed {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    summary: Option<AtomText>,
    content: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    /// `rel="alternate"` (or no rel) is the article link.
    fn article_link(&self) -> Option<String> {
        self.link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.link.first())
            .and_then(|l| l.href.clone())
    }
}

/// (title, body, link, date) as read from the document.
type Entry = (Option<String>, Option<String>, Option<String>, Option<String>);

/// Parse a feed date: RFC 2822 (RSS) first, then RFC 3339 (Atom, some RSS feeds).
pub fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let ts = ts.trim();
    if let Some(dt) = OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
    {
        return Some(dt);
    }
    DateTime::parse_from_rfc2822(ts)
        .or_else(|_| DateTime::parse_from_rfc3339(ts))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an RSS 2.0, RSS 1.0 or Atom document into normalized items.
///
/// Entries without a title are skipped. At most `max_entries` entries are read;
/// entries without a parsable date are stamped with `now`.
pub fn parse_feed(
    xml: &str,
    source_name: &str,
    max_entries: usize,
    now: DateTime<Utc>,
) -> Result<Vec<RawItem>, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let head: String = xml_clean.chars().take(2048).collect::<String>().to_ascii_lowercase();
    let entries: Vec<Entry> = if head.contains("<rss") {
        let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Parse(e.to_string()))?;
        rss.channel
            .item
            .into_iter()
            .take(max_entries)
            .map(RssItem::into_entry)
            .collect()
    } else if head.contains("<rdf:rdf") {
        let rdf: RdfFeed = from_str(&xml_clean).map_err(|e| FetchError::Parse(e.to_string()))?;
        rdf.item
            .into_iter()
            .take(max_entries)
            .map(RssItem::into_entry)
            .collect()
    } else if head.contains("<feed") {
        let feed: AtomFeed = from_str(&xml_clean).map_err(|e| FetchError::Parse(e.to_string()))?;
        feed.entry
            .into_iter()
            .take(max_entries)
            .map(|e| {
                let link = e.article_link();
                let body = e.summary.or(e.content).map(|t| t.text);
                let date = e.published.or(e.updated);
                (e.title.map(|t| t.text), body, link, date)
            })
            .collect()
    } else {
        return Err(FetchError::Parse("not an RSS, RDF or Atom document".into()));
    };

    let mut out = Vec::with_capacity(entries.len());
    for (title, body, link, date) in entries {
        let title = normalize_text(title.as_deref().unwrap_or_default());
        if title.is_empty() {
            continue;
        }
        out.push(RawItem {
            title,
            body: normalize_text(body.as_deref().unwrap_or_default()),
            link: link.map(|l| l.trim().to_string()).unwrap_or_default(),
            published_at: date.as_deref().and_then(parse_feed_date).unwrap_or(now),
            source_name: source_name.to_string(),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("digest_feed_parse_ms").record(ms);
    Ok(out)
}

/// Fetches feeds over HTTP with a browser-like user agent.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    max_entries: usize,
}

impl HttpFeedFetcher {
    pub fn new(timeout: Duration, max_entries: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .connect_timeout(Duration::from_secs(5).min(timeout))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            max_entries,
        })
    }
}

#[async_trait]
impl SourceFetcher for HttpFeedFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, FetchError> {
        let resp = self.client.get(&source.url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let bytes = resp.bytes().await?;
        if let Some(enc) = declared_encoding(&bytes).filter(|e| !is_utf8_label(e)) {
            tracing::warn!(source = %source.name, encoding = %enc,
                "feed declares a non-UTF-8 encoding; text is read as UTF-8 and may be garbled");
        }
        let body = String::from_utf8_lossy(&bytes);
        parse_feed(&body, &source.name, self.max_entries, Utc::now())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// `encoding="..."` from the XML declaration, if the document has one.
pub fn declared_encoding(bytes: &[u8]) -> Option<String> {
    static RE_DECL: once_cell::sync::OnceCell<regex::bytes::Regex> =
        once_cell::sync::OnceCell::new();
    let re = RE_DECL.get_or_init(|| {
        let pat = r#"(?i)^\s*<\?xml[^>]*?encoding\s*=\s*["']([A-Za-z0-9._-]+)["']"#;
        regex::bytes::Regex::new(pat).unwrap()
    });
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let head = &bytes[..bytes.len().min(256)];
    re.captures(head)
        .and_then(|c| c.get(1))
        .map(|m| String::from_utf8_lossy(m.as_bytes()).to_ascii_lowercase())
}

fn is_utf8_label(enc: &str) -> bool {
    matches!(enc, "utf-8" | "utf8")
}

/// HTML entities that are not valid XML would otherwise abort the whole document.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
        .replace("&hellip;", "...")
}
