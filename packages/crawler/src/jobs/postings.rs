//! JobPostingsJob - today's postings from the board, with body text taken
//! from the attached document when possible.
//!
//! ```text
//! list pages 1..=N (plain HTTP) ─► rows posted today ─► dedup by URL
//!     └─► per posting: document conversion ─► detail page text ─► sentinel
//!             └─► RecordSink (check by URL, then update or create)
//! ```
//!
//! A run interrupted by shutdown delivers nothing: a sentinel written then
//! would overwrite content the backend already holds.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::common::{JobPostingRecord, Record};
use crate::extraction::{
    normalize, parse_posting_list, DirectPageStrategy, DocumentConversionStrategy,
    ChainError, DocumentConverter, DocumentRef, ExtractionChain, PostingSummary,
    CONTENT_UNAVAILABLE,
};
use crate::kernel::{CrawlerDeps, LoadOptions};
use crate::scheduler::{CrawlJob, JobRunSummary};
use crate::sink::RecordSink;
use crate::sources::PostingSettings;

pub struct JobPostingsJob {
    board_url: String,
    settings: PostingSettings,
    offset: FixedOffset,
    http: reqwest::Client,
    chain: ExtractionChain<DocumentRef, String>,
    sink: Arc<RecordSink>,
    shutdown: CancellationToken,
}

impl JobPostingsJob {
    pub const NAME: &'static str = "job-postings";

    pub fn new(
        board_url: impl Into<String>,
        deps: &CrawlerDeps,
        options: LoadOptions,
        converter: Arc<dyn DocumentConverter>,
        settings: PostingSettings,
        offset: FixedOffset,
        sink: Arc<RecordSink>,
    ) -> Self {
        let chain = ExtractionChain::new(Self::NAME)
            .then(DocumentConversionStrategy::new(
                deps.page_loader(),
                options.clone(),
                deps.downloader.clone(),
                converter,
                settings.attachment_selector.clone(),
            ))
            .then(DirectPageStrategy::new(
                deps.page_loader(),
                options,
                settings.content_container.clone(),
            ))
            .normalize_with(normalize)
            .or_fallback(CONTENT_UNAVAILABLE.to_string());

        Self {
            board_url: board_url.into(),
            settings,
            offset,
            http: deps.http.clone(),
            chain,
            sink,
            shutdown: deps.shutdown.clone(),
        }
    }

    fn list_url(&self, page: u32) -> Result<Url> {
        let mut url = Url::parse(&self.board_url)
            .and_then(|base| base.join(&self.settings.list_path))
            .with_context(|| format!("Invalid posting board URL {}", self.board_url))?;
        url.query_pairs_mut().append_pair("page", &page.to_string());
        Ok(url)
    }

    async fn fetch_list(&self, url: &Url) -> Result<String> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to fetch {url}"))?
            .error_for_status()
            .with_context(|| format!("Posting list {url} returned an error status"))?;
        response.text().await.context("Failed to read posting list body")
    }

    /// Postings listed on `today` across the configured pages, first occurrence wins.
    pub async fn collect(&self, today: NaiveDate) -> Result<Vec<PostingSummary>> {
        let mut seen = HashSet::new();
        let mut postings = Vec::new();

        for page in 1..=self.settings.max_pages.max(1) {
            let url = self.list_url(page)?;
            let html = match self.fetch_list(&url).await {
                Ok(html) => html,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!(page, error = %format!("{e:#}"), "posting list page failed, stopping");
                    break;
                }
            };

            let rows = parse_posting_list(&html, &url, &self.settings, today)?;
            debug!(page, rows = rows.len(), "parsed posting list page");
            postings.extend(rows.into_iter().filter(|p| seen.insert(p.url.clone())));
        }

        Ok(postings)
    }

    async fn to_record(&self, posting: PostingSummary) -> Result<JobPostingRecord> {
        let content = match self.chain.extract(&DocumentRef::new(&posting.url)).await {
            Ok(outcome) => {
                info!(
                    url = %posting.url,
                    strategy = %outcome.strategy_used,
                    attempts = outcome.attempts.len(),
                    "posting content extracted"
                );
                outcome.output
            }
            Err(e @ ChainError::Cancelled { .. }) => return Err(e.into()),
            Err(e) => {
                warn!(url = %posting.url, error = %e, "posting content unavailable");
                CONTENT_UNAVAILABLE.to_string()
            }
        };

        Ok(JobPostingRecord {
            url: posting.url,
            title: posting.title,
            content,
            site: self.settings.site.clone(),
        })
    }

    pub async fn run_for(&self, today: NaiveDate) -> Result<JobRunSummary> {
        let postings = self.collect(today).await?;
        info!(date = %today, postings = postings.len(), "postings listed today");

        let total = postings.len();
        let mut records = Vec::with_capacity(total);
        for posting in postings {
            let url = posting.url.clone();
            let record = self
                .to_record(posting)
                .await
                .with_context(|| format!("Stopped at posting {url}"))?;
            records.push(Record::from(record));
        }

        if self.shutdown.is_cancelled() {
            bail!("shutdown requested, {total} postings not delivered");
        }

        let report = self.sink.deliver(Self::NAME, records).await;
        Ok(JobRunSummary::from(&report))
    }
}

#[async_trait]
impl CrawlJob for JobPostingsJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<JobRunSummary> {
        let today = Utc::now().with_timezone(&self.offset).date_naive();
        self.run_for(today).await
    }
}
