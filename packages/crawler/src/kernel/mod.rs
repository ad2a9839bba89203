//! Kernel module - crawler infrastructure and dependencies.

pub mod backend;
pub mod browser;
pub mod deps;
pub mod download;
pub mod page_loader;
pub mod process;
pub mod test_dependencies;
pub mod traits;

pub use browser::{BrowserSettings, ChromiumBrowser};
pub use deps::CrawlerDeps;
pub use download::{HttpDownloader, USER_AGENT};
pub use page_loader::{
    Acquired, LoadOptions, PageGuard, PageLoadResult, PageLoader, Readiness, RenderedPage,
};
pub use process::{run_command, ProcessError};
pub use test_dependencies::TestDependencies;
pub use traits::*;
