// Trend Crawler - Core
//
// Periodically pulls keywords, stock movers, job postings and heatmap images
// from dynamically rendered sources and forwards normalized records to the
// backend API.
//
// Scheduler -> Job -> PageLoader -> ExtractionChain -> RecordSink

pub mod common;
pub mod config;
pub mod extraction;
pub mod jobs;
pub mod kernel;
pub mod scheduler;
pub mod sink;
pub mod sources;

pub use config::*;
