// src/ingest/providers/mod.rs
pub mod fixture;
pub mod rss;

pub use fixture::FixtureFetcher;
pub use rss::HttpFeedFetcher;
