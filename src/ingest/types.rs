// src/ingest/types.rs
use chrono::{DateTime, Utc};

use crate::error::FetchError;
use crate::sources::Source;

/// One feed entry as fetched, after text normalization. Lives for a single run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RawItem {
    pub title: String,
    pub body: String,
    /// May be empty when the feed entry carries no link.
    pub link: String,
    pub published_at: DateTime<Utc>,
    pub source_name: String,
}

/// Feed-fetching capability. A failure for one source must never affect another.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<Vec<RawItem>, FetchError>;
    fn name(&self) -> &'static str;
}
