//! Rendered page acquisition with bounded retries.
//!
//! # Attempt shape
//!
//! ```text
//! open session (once per call, reopened after a browser failure)
//!     │
//!     ├─► navigate ── timeout(navigation) ──► stop loading ─► reload ── timeout(reload)
//!     ├─► settle delay
//!     └─► readiness (selector wait with its own timeout, or a fixed render delay)
//! ```
//!
//! Every attempt runs under an overall attempt timeout and races the shutdown
//! token, so a call never takes longer than
//! `max_retries × (attempt_timeout + retry_delay)` plus one bounded content
//! snapshot. The session is released on every exit path: explicitly through
//! [`PageGuard::close`], or from `Drop` as a fallback.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BaseBrowser, BrowserSession, PageError};

/// Budget for launching a browsing context.
const OPEN_BUDGET: Duration = Duration::from_secs(30);
/// Budget for the `window.stop()` call after a slow navigation.
const STOP_BUDGET: Duration = Duration::from_secs(5);
/// Budget for serializing the DOM once the attempts are over.
const SNAPSHOT_BUDGET: Duration = Duration::from_secs(10);

/// What "usable" means for a loaded page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    None,
    /// A CSS selector that must match before the attempt counts as successful.
    Selector(String),
    /// Fixed render wait for panels filled in by script after load.
    Delay(Duration),
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub navigation_timeout: Duration,
    pub reload_timeout: Duration,
    pub settle_delay: Duration,
    pub ready_timeout: Duration,
    pub readiness: Readiness,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(5),
            reload_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(60),
            readiness: Readiness::None,
        }
    }
}

impl LoadOptions {
    pub fn with_readiness(mut self, readiness: Readiness) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_selector(self, selector: impl Into<String>) -> Self {
        self.with_readiness(Readiness::Selector(selector.into()))
    }

    /// Upper bound for one attempt, open through readiness.
    pub fn attempt_timeout(&self) -> Duration {
        let readiness = match &self.readiness {
            Readiness::None => Duration::ZERO,
            Readiness::Selector(_) => self.ready_timeout,
            Readiness::Delay(delay) => *delay,
        };
        OPEN_BUDGET
            + self.navigation_timeout
            + STOP_BUDGET
            + self.reload_timeout
            + self.settle_delay
            + readiness
    }

    /// Worst-case wall time of a whole `load` call.
    pub fn total_budget(&self) -> Duration {
        (self.attempt_timeout() + self.retry_delay) * self.max_retries.max(1) + SNAPSHOT_BUDGET
    }
}

/// Serialized DOM captured after the attempts finished.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub url: String,
    pub html: String,
    pub captured_at: DateTime<Utc>,
}

/// Result of [`PageLoader::load`]. Check `succeeded` before trusting `content`.
#[derive(Debug, Clone)]
pub struct PageLoadResult {
    pub content: RenderedPage,
    pub succeeded: bool,
    pub attempts_used: u32,
    /// Shutdown fired before the page became ready.
    pub cancelled: bool,
}

/// Result of [`PageLoader::acquire`]: the live page, if any session survived.
pub struct Acquired {
    pub page: Option<PageGuard>,
    pub succeeded: bool,
    pub attempts_used: u32,
    pub cancelled: bool,
}

/// Owns a browser session until `close()` or drop.
pub struct PageGuard {
    session: Option<Box<dyn BrowserSession>>,
    url: String,
    runtime: Handle,
}

impl PageGuard {
    fn new(session: Box<dyn BrowserSession>, url: &str) -> Self {
        Self {
            session: Some(session),
            url: url.to_string(),
            runtime: Handle::current(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn session(&self) -> Result<&dyn BrowserSession, PageError> {
        self.session
            .as_deref()
            .ok_or_else(|| PageError::Browser("session already closed".to_string()))
    }

    /// Bounded DOM snapshot. Failures yield an empty document.
    pub async fn snapshot(&self) -> RenderedPage {
        let html = match self.session.as_deref() {
            Some(session) => match timeout(SNAPSHOT_BUDGET, session.content()).await {
                Ok(Ok(html)) => html,
                Ok(Err(e)) => {
                    warn!(url = %self.url, error = %e, "failed to read page content");
                    String::new()
                }
                Err(_) => {
                    warn!(url = %self.url, "page content snapshot timed out");
                    String::new()
                }
            },
            None => String::new(),
        };

        RenderedPage {
            url: self.url.clone(),
            html,
            captured_at: Utc::now(),
        }
    }

    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            close_session(session, &self.url).await;
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let url = std::mem::take(&mut self.url);
            debug!(url = %url, "page guard dropped without close, releasing in background");
            self.runtime.spawn(async move {
                close_session(session, &url).await;
            });
        }
    }
}

async fn close_session(session: Box<dyn BrowserSession>, url: &str) {
    match timeout(OPEN_BUDGET, session.close()).await {
        Ok(Ok(())) => debug!(url = %url, "browser session closed"),
        Ok(Err(e)) => warn!(url = %url, error = %e, "browser session close failed"),
        Err(_) => warn!(url = %url, "browser session close timed out"),
    }
}

#[derive(Clone)]
pub struct PageLoader {
    browser: Arc<dyn BaseBrowser>,
    shutdown: CancellationToken,
}

impl PageLoader {
    pub fn new(browser: Arc<dyn BaseBrowser>, shutdown: CancellationToken) -> Self {
        Self { browser, shutdown }
    }

    /// Load `url`, snapshot its DOM and release the session.
    pub async fn load(&self, url: &str, options: &LoadOptions) -> PageLoadResult {
        let acquired = self.acquire(url, options).await;

        let content = match acquired.page {
            Some(page) => {
                let content = page.snapshot().await;
                page.close().await;
                content
            }
            None => RenderedPage {
                url: url.to_string(),
                html: String::new(),
                captured_at: Utc::now(),
            },
        };

        PageLoadResult {
            content,
            succeeded: acquired.succeeded,
            attempts_used: acquired.attempts_used,
            cancelled: acquired.cancelled,
        }
    }

    /// Run the retry loop and hand the live session to the caller.
    pub async fn acquire(&self, url: &str, options: &LoadOptions) -> Acquired {
        let max_attempts = options.max_retries.max(1);
        let attempt_timeout = options.attempt_timeout();
        let mut slot: Option<Box<dyn BrowserSession>> = None;
        let mut attempts_used = 0;
        let mut succeeded = false;
        let mut cancelled = false;

        for attempt in 1..=max_attempts {
            if self.shutdown.is_cancelled() {
                cancelled = true;
                break;
            }
            attempts_used = attempt;

            let outcome = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => Err(PageError::Cancelled),
                result = timeout(attempt_timeout, self.attempt(&mut slot, url, options)) => {
                    result.unwrap_or(Err(PageError::AttemptTimeout(attempt_timeout)))
                }
            };

            match outcome {
                Ok(()) => {
                    debug!(url = %url, attempt, "page ready");
                    succeeded = true;
                    break;
                }
                Err(PageError::Cancelled) => {
                    cancelled = true;
                    break;
                }
                Err(e) => {
                    warn!(
                        url = %url,
                        attempt,
                        max_attempts,
                        error = %e,
                        "page load attempt failed"
                    );
                    if matches!(e, PageError::Browser(_)) {
                        if let Some(session) = slot.take() {
                            close_session(session, url).await;
                        }
                    }
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(options.retry_delay) => {}
                }
            }
        }

        if cancelled {
            info!(url = %url, attempts_used, "page load cancelled by shutdown");
            if let Some(session) = slot.take() {
                close_session(session, url).await;
            }
        } else if !succeeded {
            warn!(url = %url, attempts_used, "page load retries exhausted");
        }

        Acquired {
            page: slot.map(|session| PageGuard::new(session, url)),
            succeeded,
            attempts_used,
            cancelled,
        }
    }

    async fn attempt(
        &self,
        slot: &mut Option<Box<dyn BrowserSession>>,
        url: &str,
        options: &LoadOptions,
    ) -> Result<(), PageError> {
        if slot.is_none() {
            *slot = Some(self.browser.open().await?);
        }
        let Some(session) = slot.as_deref() else {
            return Err(PageError::Browser("no browser session".to_string()));
        };

        match timeout(options.navigation_timeout, session.navigate(url)).await {
            Ok(result) => result?,
            Err(_) => {
                debug!(url = %url, "navigation slow, stopping load and reloading");
                match timeout(STOP_BUDGET, session.stop_loading()).await {
                    Ok(Err(e)) => debug!(url = %url, error = %e, "stop loading failed"),
                    Err(_) => debug!(url = %url, "stop loading timed out"),
                    Ok(Ok(())) => {}
                }
                timeout(options.reload_timeout, session.reload())
                    .await
                    .map_err(|_| PageError::NavigationTimeout {
                        url: url.to_string(),
                        timeout: options.reload_timeout,
                    })??;
            }
        }

        tokio::time::sleep(options.settle_delay).await;

        match &options.readiness {
            Readiness::None => Ok(()),
            Readiness::Delay(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            Readiness::Selector(selector) => {
                timeout(options.ready_timeout, session.wait_for_selector(selector))
                    .await
                    .map_err(|_| PageError::NotReady {
                        selector: selector.clone(),
                        timeout: options.ready_timeout,
                    })?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{MockBrowser, PageBehavior};

    const READY_HTML: &str = r#"<html><body><table class="ready"><tr><td>1</td></tr></table></body></html>"#;

    fn loader(browser: Arc<MockBrowser>) -> PageLoader {
        PageLoader::new(browser, CancellationToken::new())
    }

    #[tokio::test(start_paused = true)]
    async fn ready_page_succeeds_on_first_attempt() {
        let browser = Arc::new(MockBrowser::new().with_page("https://a.test/", READY_HTML));
        let options = LoadOptions::default().with_selector("table.ready");

        let result = loader(browser.clone()).load("https://a.test/", &options).await;

        assert!(result.succeeded);
        assert!(!result.cancelled);
        assert_eq!(result.attempts_used, 1);
        assert!(result.content.html.contains("ready"));
        assert_eq!(browser.sessions_opened(), 1);
        assert_eq!(browser.sessions_closed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_selector_exhausts_retries_and_keeps_partial_content() {
        let browser = Arc::new(
            MockBrowser::new().with_page("https://a.test/", "<html><body><p>partial</p></body></html>"),
        );
        let options = LoadOptions::default().with_selector("table.ready");

        let result = loader(browser.clone()).load("https://a.test/", &options).await;

        assert!(!result.succeeded);
        assert_eq!(result.attempts_used, 3);
        assert!(result.content.html.contains("partial"));
        assert_eq!(browser.navigations("https://a.test/"), 3);
        assert_eq!(browser.sessions_closed(), browser.sessions_opened());
    }

    #[tokio::test(start_paused = true)]
    async fn browser_failure_reopens_session() {
        let browser = Arc::new(
            MockBrowser::new()
                .with_page("https://a.test/", READY_HTML)
                .failing_first("https://a.test/", 1),
        );
        let options = LoadOptions::default().with_selector("table.ready");

        let result = loader(browser.clone()).load("https://a.test/", &options).await;

        assert!(result.succeeded);
        assert_eq!(result.attempts_used, 2);
        assert_eq!(browser.sessions_opened(), 2);
        assert_eq!(browser.sessions_closed(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_retry_wait() {
        let browser = Arc::new(
            MockBrowser::new().with_behavior("https://slow.test/", PageBehavior::Hang),
        );
        let shutdown = CancellationToken::new();
        let loader = PageLoader::new(browser.clone(), shutdown.clone());
        let options = LoadOptions::default();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let result = loader.load("https://slow.test/", &options).await;

        assert!(!result.succeeded);
        assert!(result.cancelled);
        assert_eq!(result.attempts_used, 1);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(browser.sessions_closed(), browser.sessions_opened());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_opens_no_session() {
        let browser = Arc::new(MockBrowser::new().with_page("https://a.test/", READY_HTML));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let result = PageLoader::new(browser.clone(), shutdown)
            .load("https://a.test/", &LoadOptions::default())
            .await;

        assert!(!result.succeeded);
        assert!(result.cancelled);
        assert_eq!(result.attempts_used, 0);
        assert_eq!(browser.sessions_opened(), 0);
    }

    #[test]
    fn attempt_timeout_covers_every_phase() {
        let options = LoadOptions::default().with_selector("x");
        assert_eq!(
            options.attempt_timeout(),
            OPEN_BUDGET + Duration::from_secs(5) + STOP_BUDGET + Duration::from_secs(122)
        );
        let delay = LoadOptions::default().with_readiness(Readiness::Delay(Duration::from_secs(5)));
        assert!(delay.attempt_timeout() < options.attempt_timeout());
    }
}
