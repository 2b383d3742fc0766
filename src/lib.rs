// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod config;
pub mod dedup;
pub mod digest;
pub mod error;
pub mod ingest;
pub mod notify;
pub mod pipeline;
pub mod relevance;
pub mod sources;
pub mod summarize;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::config::Config;
pub use crate::pipeline::{run_once, PipelineDeps, RunReport};
