// src/ingest/providers/fixture.rs
//! In-memory fetcher: serves canned XML, canned items or a canned failure per source name.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::FetchError;
use crate::ingest::providers::rss::parse_feed;
use crate::ingest::types::{RawItem, SourceFetcher};
use crate::sources::Source;

#[derive(Debug, Clone)]
enum Canned {
    Xml(String),
    Items(Vec<RawItem>),
    Fail(u16),
}

#[derive(Debug, Clone)]
pub struct FixtureFetcher {
    feeds: HashMap<String, Canned>,
    max_entries: usize,
}

impl Default for FixtureFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self {
            feeds: HashMap::new(),
            max_entries: 50,
        }
    }

    pub fn with_xml(mut self, source: &str, xml: &str) -> Self {
        self.feeds.insert(source.to_string(), Canned::Xml(xml.to_string()));
        self
    }

    pub fn with_items(mut self, source: &str, items: Vec<RawItem>) -> Self {
        self.feeds.insert(source.to_string(), Canned::Items(items));
        self
    }

    /// The source answers with the given HTTP status.
    pub fn with_failure(mut self, source: &str, status: u16) -> Self {
        self.feeds.insert(source.to_string(), Canned::Fail(status));
        self
    }
}

#[async_trait]
impl SourceFetcher for FixtureFetcher {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, FetchError> {
        match self.feeds.get(&source.name) {
            Some(Canned::Xml(xml)) => parse_feed(xml, &source.name, self.max_entries, Utc::now()),
            Some(Canned::Items(items)) => Ok(items.clone()),
            Some(Canned::Fail(status)) => Err(FetchError::Status(*status)),
            None => Err(FetchError::Status(404)),
        }
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}
