//! Crawler dependencies shared by every job (trait objects for testability).

use std::sync::Arc;

use anyhow::{Context, Result};
use backend_client::BackendClient;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::kernel::{
    BaseBackendApi, BaseBrowser, BaseDownloader, ChromiumBrowser, HttpDownloader, PageLoader,
    USER_AGENT,
};

#[derive(Clone)]
pub struct CrawlerDeps {
    pub browser: Arc<dyn BaseBrowser>,
    pub backend: Arc<dyn BaseBackendApi>,
    pub downloader: Arc<dyn BaseDownloader>,
    /// Plain HTTP for list pages that need no rendering.
    pub http: reqwest::Client,
    pub shutdown: CancellationToken,
}

impl CrawlerDeps {
    pub fn from_config(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let backend = BackendClient::new(&config.base_api_url, config.http_timeout)
            .context("Failed to create backend client")?;
        let downloader = HttpDownloader::new(config.conversion_timeout)?;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            browser: Arc::new(ChromiumBrowser::new(config.browser.clone())),
            backend: Arc::new(backend),
            downloader: Arc::new(downloader),
            http,
            shutdown,
        })
    }

    pub fn page_loader(&self) -> PageLoader {
        PageLoader::new(self.browser.clone(), self.shutdown.clone())
    }
}
