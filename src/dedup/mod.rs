// src/dedup/mod.rs
//! # Deduplication
//! Fingerprints of delivered items with the time they were delivered. An item whose
//! fingerprint was delivered within the window is suppressed; older fingerprints
//! expire, so a link reused months later counts as new.
//!
//! Writes happen once per run, after confirmed delivery, as one batch.

pub mod file;

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::StoreError;

pub use file::FileDedupStore;

/// Query parameters that only carry tracking state and never select content.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "yclid", "mc_cid", "mc_eid", "igshid", "spm",
    "scm", "ref", "ref_src", "from", "share", "share_token", "cmpid", "ncid",
    "_hsenc", "_hsmi",
];

fn is_tracking_param(key: &str) -> bool {
    let k = key.to_ascii_lowercase();
    k.starts_with("utm_") || TRACKING_PARAMS.contains(&k.as_str())
}

/// Stable dedup key of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical form of an article link: lowercase host without default port, path without
/// trailing slash, tracking parameters removed and the remaining query sorted. Scheme and
/// fragment are ignored. `None` if `link` is not an absolute URL with a host.
pub fn normalize_link(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();

    let mut out = host;
    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }

    let path = url.path();
    let path = if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        ""
    };
    out.push_str(path);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !pairs.is_empty() {
        pairs.sort();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish();
        out.push('?');
        out.push_str(&query);
    }

    Some(out)
}

/// Fingerprint from the normalized link, or from the title when the link is empty.
pub fn fingerprint(link: &str, title: &str) -> Fingerprint {
    let link = link.trim();
    let key = if !link.is_empty() {
        match normalize_link(link) {
            Some(n) => format!("link:{n}"),
            None => format!("link:{link}"),
        }
    } else {
        let t = title.split_whitespace().collect::<Vec<_>>().join(" ");
        format!("title:{}", t.to_lowercase())
    };

    let digest = Sha256::digest(key.as_bytes());
    let mut hex = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut hex, "{:02x}", b);
    }
    Fingerprint(hex)
}

/// Dedup state injected into the pipeline.
pub trait DedupStore: Send + Sync {
    /// Length of the suppression window.
    fn window(&self) -> Duration;

    /// True iff `fp` was marked and `now` is not past `seen_at + window`.
    fn is_seen(&self, fp: &Fingerprint, now: DateTime<Utc>) -> bool;

    /// Record all `fps` as seen at `now`, atomically. Re-marking only moves `seen_at` forward.
    fn mark_seen(&mut self, fps: &BTreeSet<Fingerprint>, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Drop records older than twice the window. Returns how many were removed.
    fn compact(&mut self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory set of seen records. Shared core of both store implementations.
#[derive(Debug, Clone)]
pub struct SeenLedger {
    records: BTreeMap<Fingerprint, DateTime<Utc>>,
    window: Duration,
}

impl SeenLedger {
    pub fn new(window: Duration) -> Self {
        Self {
            records: BTreeMap::new(),
            window,
        }
    }

    pub fn from_records<I>(window: Duration, records: I) -> Self
    where
        I: IntoIterator<Item = SeenRecord>,
    {
        let mut ledger = Self::new(window);
        for r in records {
            ledger.touch(r.fingerprint, r.seen_at);
        }
        ledger
    }

    fn touch(&mut self, fp: Fingerprint, at: DateTime<Utc>) {
        let entry = self.records.entry(fp).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn is_seen(&self, fp: &Fingerprint, now: DateTime<Utc>) -> bool {
        match self.records.get(fp) {
            Some(seen_at) => now <= *seen_at + self.window,
            None => false,
        }
    }

    pub fn mark(&mut self, fps: &BTreeSet<Fingerprint>, now: DateTime<Utc>) {
        for fp in fps {
            self.touch(fp.clone(), now);
        }
    }

    /// Removal horizon is `2 × window`, so nothing still inside the active window goes.
    pub fn compact(&mut self, now: DateTime<Utc>) -> usize {
        let horizon = now - self.window * 2;
        let before = self.records.len();
        self.records.retain(|_, seen_at| *seen_at >= horizon);
        before - self.records.len()
    }

    pub fn seen_at(&self, fp: &Fingerprint) -> Option<DateTime<Utc>> {
        self.records.get(fp).copied()
    }

    pub fn records(&self) -> Vec<SeenRecord> {
        self.records
            .iter()
            .map(|(fp, at)| SeenRecord {
                fingerprint: fp.clone(),
                seen_at: *at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Persisted form of one seen fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeenRecord {
    pub fingerprint: Fingerprint,
    pub seen_at: DateTime<Utc>,
}

/// Non-persistent store, for tests and dry runs.
#[derive(Debug, Clone)]
pub struct MemoryDedupStore {
    ledger: SeenLedger,
}

impl MemoryDedupStore {
    pub fn new(window: Duration) -> Self {
        Self {
            ledger: SeenLedger::new(window),
        }
    }

    pub fn seen_at(&self, fp: &Fingerprint) -> Option<DateTime<Utc>> {
        self.ledger.seen_at(fp)
    }
}

impl DedupStore for MemoryDedupStore {
    fn window(&self) -> Duration {
        self.ledger.window()
    }

    fn is_seen(&self, fp: &Fingerprint, now: DateTime<Utc>) -> bool {
        self.ledger.is_seen(fp, now)
    }

    fn mark_seen(
        &mut self,
        fps: &BTreeSet<Fingerprint>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.ledger.mark(fps, now);
        Ok(())
    }

    fn compact(&mut self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(self.ledger.compact(now))
    }

    fn len(&self) -> usize {
        self.ledger.len()
    }
}
