// TestDependencies - mock implementations for testing
//
// Provides mock browser, backend and downloader services that can be injected
// into CrawlerDeps for unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use backend_client::{CrawlDataPayload, CrawlDataUpdate, SearchTermPayload, UsStockPayload};
use tokio_util::sync::CancellationToken;

use super::{BaseBackendApi, BaseBrowser, BaseDownloader, BrowserSession, CrawlerDeps, PageError};

// =============================================================================
// Mock Browser
// =============================================================================

/// How a mock page reacts to navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageBehavior {
    /// Loads immediately.
    Ready,
    /// Navigation and reload never complete.
    Hang,
    /// Every navigation fails with a browser error.
    Fail,
}

#[derive(Debug, Clone)]
struct MockPage {
    html: String,
    behavior: PageBehavior,
}

#[derive(Default)]
struct BrowserState {
    pages: Mutex<HashMap<String, MockPage>>,
    fail_first: Mutex<HashMap<String, usize>>,
    navigations: Mutex<Vec<String>>,
    clicks: Mutex<Vec<String>>,
    scripts: Mutex<Vec<String>>,
    screenshot: Mutex<Option<Vec<u8>>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

pub struct MockBrowser {
    state: Arc<BrowserState>,
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrowserState::default()),
        }
    }

    pub fn with_page(self, url: &str, html: &str) -> Self {
        self.state.pages.lock().unwrap().insert(
            url.to_string(),
            MockPage {
                html: html.to_string(),
                behavior: PageBehavior::Ready,
            },
        );
        self
    }

    pub fn with_behavior(self, url: &str, behavior: PageBehavior) -> Self {
        self.state
            .pages
            .lock()
            .unwrap()
            .entry(url.to_string())
            .and_modify(|page| page.behavior = behavior)
            .or_insert(MockPage {
                html: String::new(),
                behavior,
            });
        self
    }

    /// Fail the first `count` navigations to `url` with a browser error.
    pub fn failing_first(self, url: &str, count: usize) -> Self {
        self.state
            .fail_first
            .lock()
            .unwrap()
            .insert(url.to_string(), count);
        self
    }

    pub fn with_screenshot(self, bytes: Vec<u8>) -> Self {
        *self.state.screenshot.lock().unwrap() = Some(bytes);
        self
    }

    pub fn sessions_opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn navigations(&self, url: &str) -> usize {
        self.state
            .navigations
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.as_str() == url)
            .count()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.clicks.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseBrowser for MockBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, PageError> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: self.state.clone(),
            current: Mutex::new(None),
        }))
    }
}

struct MockSession {
    state: Arc<BrowserState>,
    current: Mutex<Option<String>>,
}

impl MockSession {
    fn current_page(&self) -> Option<MockPage> {
        let url = self.current.lock().unwrap().clone()?;
        self.state.pages.lock().unwrap().get(&url).cloned()
    }

    fn matches(&self, selector: &str) -> Result<bool, PageError> {
        let selector = scraper::Selector::parse(selector)
            .map_err(|e| PageError::Browser(format!("bad selector {selector}: {e}")))?;
        let html = self.current_page().map(|p| p.html).unwrap_or_default();
        let document = scraper::Html::parse_document(&html);
        let found = document.select(&selector).next().is_some();
        Ok(found)
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.state.navigations.lock().unwrap().push(url.to_string());
        *self.current.lock().unwrap() = Some(url.to_string());

        let should_fail = {
            let mut fail_first = self.state.fail_first.lock().unwrap();
            match fail_first.get_mut(url) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if should_fail {
            return Err(PageError::Browser("mock navigation failure".to_string()));
        }

        match self.current_page().map(|p| p.behavior) {
            Some(PageBehavior::Ready) => Ok(()),
            Some(PageBehavior::Hang) => std::future::pending().await,
            Some(PageBehavior::Fail) => Err(PageError::Browser("mock page failure".to_string())),
            None => Err(PageError::Browser(format!("no mock page for {url}"))),
        }
    }

    async fn stop_loading(&self) -> Result<(), PageError> {
        Ok(())
    }

    async fn reload(&self) -> Result<(), PageError> {
        match self.current_page().map(|p| p.behavior) {
            Some(PageBehavior::Hang) => std::future::pending().await,
            Some(PageBehavior::Fail) | None => {
                Err(PageError::Browser("mock reload failure".to_string()))
            }
            Some(PageBehavior::Ready) => Ok(()),
        }
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), PageError> {
        if self.matches(selector)? {
            Ok(())
        } else {
            std::future::pending().await
        }
    }

    async fn content(&self) -> Result<String, PageError> {
        Ok(self.current_page().map(|p| p.html).unwrap_or_default())
    }

    async fn click(&self, selector: &str) -> Result<bool, PageError> {
        self.state.clicks.lock().unwrap().push(selector.to_string());
        self.matches(selector)
    }

    async fn evaluate(&self, script: &str) -> Result<(), PageError> {
        self.state.scripts.lock().unwrap().push(script.to_string());
        Ok(())
    }

    async fn screenshot_element(
        &self,
        selector: &str,
        _max_width: f64,
        _max_height: f64,
    ) -> Result<Vec<u8>, PageError> {
        if !self.matches(selector)? {
            return Err(PageError::ElementNotFound(selector.to_string()));
        }
        Ok(self
            .state
            .screenshot
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| b"\x89PNG mock".to_vec()))
    }

    async fn close(self: Box<Self>) -> Result<(), PageError> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Mock Backend
// =============================================================================

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    PostSearchTerm(SearchTermPayload),
    Check(String),
    Create(CrawlDataPayload),
    Update(CrawlDataUpdate),
    PostStock(UsStockPayload),
    Presign { key: String, content_type: String },
    Upload { url: String, size: usize },
}

pub struct MockBackend {
    calls: Mutex<Vec<BackendCall>>,
    existing: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
    upload_base: String,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            existing: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
            upload_base: "https://storage.test".to_string(),
        }
    }

    /// Pretend `url` was stored by an earlier run.
    pub fn with_existing(self, url: &str) -> Self {
        self.existing.lock().unwrap().insert(url.to_string());
        self
    }

    /// Fail every call whose key (keyword, url, symbol or upload key) is `key`.
    pub fn failing_on(self, key: &str) -> Self {
        self.failing.lock().unwrap().insert(key.to_string());
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> Vec<CrawlDataPayload> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Create(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn updates(&self) -> Vec<CrawlDataUpdate> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Update(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn search_terms(&self) -> Vec<SearchTermPayload> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::PostSearchTerm(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn stocks(&self) -> Vec<UsStockPayload> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::PostStock(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BackendCall, key: &str) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(key) {
            anyhow::bail!("mock backend failure for {}", key);
        }
        Ok(())
    }
}

#[async_trait]
impl BaseBackendApi for MockBackend {
    async fn post_search_term(&self, payload: &SearchTermPayload) -> Result<()> {
        self.record(BackendCall::PostSearchTerm(payload.clone()), &payload.keyword)
    }

    async fn crawl_data_exists(&self, url: &str) -> Result<bool> {
        self.record(BackendCall::Check(url.to_string()), url)?;
        Ok(self.existing.lock().unwrap().contains(url))
    }

    async fn create_crawl_data(&self, payload: &CrawlDataPayload) -> Result<()> {
        self.record(BackendCall::Create(payload.clone()), &payload.url)?;
        self.existing.lock().unwrap().insert(payload.url.clone());
        Ok(())
    }

    async fn update_crawl_data(&self, payload: &CrawlDataUpdate) -> Result<()> {
        self.record(BackendCall::Update(payload.clone()), &payload.url)
    }

    async fn post_us_stock(&self, payload: &UsStockPayload) -> Result<()> {
        self.record(BackendCall::PostStock(payload.clone()), &payload.symbol)
    }

    async fn presigned_put_url(&self, key: &str, content_type: &str) -> Result<String> {
        self.record(
            BackendCall::Presign {
                key: key.to_string(),
                content_type: content_type.to_string(),
            },
            key,
        )?;
        Ok(format!("{}/{}?X-Amz-Signature=mock", self.upload_base, key))
    }

    async fn upload_presigned(&self, url: &str, bytes: Vec<u8>, _content_type: &str) -> Result<()> {
        self.record(
            BackendCall::Upload {
                url: url.to_string(),
                size: bytes.len(),
            },
            url,
        )
    }
}

// =============================================================================
// Mock Downloader
// =============================================================================

pub struct MockDownloader {
    files: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl Default for MockDownloader {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDownloader {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_file(self, url: &str, bytes: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseDownloader for MockDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        self.files
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("HTTP 404 Not Found for {}", url))
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Builder for `CrawlerDeps` wired to mocks.
pub struct TestDependencies {
    pub browser: Arc<MockBrowser>,
    pub backend: Arc<MockBackend>,
    pub downloader: Arc<MockDownloader>,
    pub shutdown: CancellationToken,
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            browser: Arc::new(MockBrowser::new()),
            backend: Arc::new(MockBackend::new()),
            downloader: Arc::new(MockDownloader::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn mock_browser(mut self, browser: MockBrowser) -> Self {
        self.browser = Arc::new(browser);
        self
    }

    pub fn mock_backend(mut self, backend: MockBackend) -> Self {
        self.backend = Arc::new(backend);
        self
    }

    pub fn mock_downloader(mut self, downloader: MockDownloader) -> Self {
        self.downloader = Arc::new(downloader);
        self
    }

    pub fn deps(&self) -> CrawlerDeps {
        CrawlerDeps {
            browser: self.browser.clone(),
            backend: self.backend.clone(),
            downloader: self.downloader.clone(),
            http: reqwest::Client::new(),
            shutdown: self.shutdown.clone(),
        }
    }
}
