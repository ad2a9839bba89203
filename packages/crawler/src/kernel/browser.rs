//! Headless Chromium sessions via chromiumoxide.
//!
//! Each `open()` launches its own browser process so no cookies, cache or
//! page state leak between jobs. `close()` shuts the page, the browser and the
//! CDP handler task down.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, ReloadParams, Viewport};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::download::USER_AGENT;
use super::{BaseBrowser, BrowserSession, PageError};

/// Poll interval for selector waits.
const SELECTOR_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            window_width: 1920,
            window_height: 1080,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

fn cdp(e: CdpError) -> PageError {
    PageError::Browser(e.to_string())
}

pub struct ChromiumBrowser {
    settings: BrowserSettings,
}

impl ChromiumBrowser {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn launch_config(&self) -> Result<BrowserConfig, PageError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.settings.window_width, self.settings.window_height)
            .args(vec![
                "--no-sandbox",
                "--disable-gpu",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--no-first-run",
                "--disable-blink-features=AutomationControlled",
            ]);

        if !self.settings.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.settings.executable {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(PageError::Browser)
    }
}

#[async_trait]
impl BaseBrowser for ChromiumBrowser {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, PageError> {
        let (mut browser, mut handler) = Browser::launch(self.launch_config()?)
            .await
            .map_err(cdp)?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(cdp(e));
            }
        };

        if let Err(e) = page.set_user_agent(self.settings.user_agent.as_str()).await {
            warn!(error = %e, "failed to override user agent");
        }
        // Hide the automation flag some sources check before rendering.
        if let Err(e) = page
            .evaluate_on_new_document(
                "Object.defineProperty(navigator, 'webdriver', { get: () => undefined });",
            )
            .await
        {
            debug!(error = %e, "failed to install init script");
        }

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }
}

struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        self.page.goto(url).await.map_err(cdp)?;
        Ok(())
    }

    async fn stop_loading(&self) -> Result<(), PageError> {
        self.page.evaluate("window.stop();").await.map_err(cdp)?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), PageError> {
        self.page
            .execute(ReloadParams::default())
            .await
            .map_err(cdp)?;
        self.page.wait_for_navigation().await.map_err(cdp)?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<(), PageError> {
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }

    async fn content(&self) -> Result<String, PageError> {
        self.page.content().await.map_err(cdp)
    }

    async fn click(&self, selector: &str) -> Result<bool, PageError> {
        match self.page.find_element(selector).await {
            Ok(element) => {
                element.click().await.map_err(cdp)?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<(), PageError> {
        self.page.evaluate(script).await.map_err(cdp)?;
        Ok(())
    }

    async fn screenshot_element(
        &self,
        selector: &str,
        max_width: f64,
        max_height: f64,
    ) -> Result<Vec<u8>, PageError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| PageError::ElementNotFound(selector.to_string()))?;
        let bbox = element.bounding_box().await.map_err(cdp)?;

        let clip = Viewport {
            x: bbox.x,
            y: bbox.y,
            width: bbox.width.min(max_width),
            height: bbox.height.min(max_height),
            scale: 1.0,
        };

        self.page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .clip(clip)
                    .build(),
            )
            .await
            .map_err(cdp)
    }

    async fn close(self: Box<Self>) -> Result<(), PageError> {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
        } = *self;

        if let Err(e) = page.close().await {
            debug!(error = %e, "page close failed, closing browser anyway");
        }
        let closed = browser.close().await.map(|_| ()).map_err(cdp);
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "browser process did not exit cleanly");
        }
        handler_task.abort();
        closed
    }
}
