// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no source-specific logic.
// Jobs and extraction strategies depend on these, never on concrete clients.
//
// Naming convention: Base* for service traits (e.g., BaseBrowser, BaseBackendApi)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use backend_client::{CrawlDataPayload, CrawlDataUpdate, SearchTermPayload, UsStockPayload};
use thiserror::Error;

// =============================================================================
// Browser Traits (Infrastructure - rendered page access)
// =============================================================================

/// Failures while driving a rendered page.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("readiness selector `{selector}` not found within {timeout:?}")]
    NotReady { selector: String, timeout: Duration },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("page attempt exceeded {0:?}")]
    AttemptTimeout(Duration),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("page load cancelled")]
    Cancelled,
}

/// Launches isolated browsing contexts. Every call returns a fresh session.
#[async_trait]
pub trait BaseBrowser: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, PageError>;
}

/// One live page. Methods never enforce their own deadlines; callers wrap
/// them in `tokio::time::timeout`.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate and wait for the load event.
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    /// Equivalent of `window.stop()`.
    async fn stop_loading(&self) -> Result<(), PageError>;

    /// Reload the current document and wait for the load event.
    async fn reload(&self) -> Result<(), PageError>;

    /// Resolve once `selector` matches an element (polls until it does).
    async fn wait_for_selector(&self, selector: &str) -> Result<(), PageError>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String, PageError>;

    /// Click the first match. Returns false when nothing matched.
    async fn click(&self, selector: &str) -> Result<bool, PageError>;

    async fn evaluate(&self, script: &str) -> Result<(), PageError>;

    /// PNG of the first match's bounding box, clipped to `max_width` x `max_height`.
    async fn screenshot_element(
        &self,
        selector: &str,
        max_width: f64,
        max_height: f64,
    ) -> Result<Vec<u8>, PageError>;

    async fn close(self: Box<Self>) -> Result<(), PageError>;
}

// =============================================================================
// Download Trait (Infrastructure - binary attachments)
// =============================================================================

#[async_trait]
pub trait BaseDownloader: Send + Sync {
    /// Fetch a binary document. Non-2xx responses are errors.
    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

// =============================================================================
// Backend Trait (Infrastructure - record sink transport)
// =============================================================================

#[async_trait]
pub trait BaseBackendApi: Send + Sync {
    async fn post_search_term(&self, payload: &SearchTermPayload) -> Result<()>;

    async fn crawl_data_exists(&self, url: &str) -> Result<bool>;

    async fn create_crawl_data(&self, payload: &CrawlDataPayload) -> Result<()>;

    async fn update_crawl_data(&self, payload: &CrawlDataUpdate) -> Result<()>;

    async fn post_us_stock(&self, payload: &UsStockPayload) -> Result<()>;

    /// Short-lived PUT URL for `key`.
    async fn presigned_put_url(&self, key: &str, content_type: &str) -> Result<String>;

    /// Upload bytes straight to storage using a presigned URL.
    async fn upload_presigned(&self, url: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<()>;
}
