//! Scheduled crawl jobs, one per source.

pub mod heatmap;
pub mod postings;
pub mod realtime;
pub mod registry;
pub mod stock_movers;

pub use heatmap::HeatmapJob;
pub use postings::JobPostingsJob;
pub use realtime::RealtimeKeywordsJob;
pub use registry::build_scheduler;
pub use stock_movers::StockMoversJob;
