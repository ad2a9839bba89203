//! RealtimeKeywordsJob - ranked search terms from the realtime panel page.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::info;

use crate::common::{KeywordRecord, Record};
use crate::extraction::{ExtractionChain, KeywordPanelStrategy};
use crate::kernel::{CrawlerDeps, LoadOptions, PageLoader, Readiness, RenderedPage};
use crate::scheduler::{CrawlJob, JobRunSummary};
use crate::sink::RecordSink;
use crate::sources::KeywordPanelSettings;

pub struct RealtimeKeywordsJob {
    url: String,
    loader: PageLoader,
    options: LoadOptions,
    chain: ExtractionChain<RenderedPage, Vec<KeywordRecord>>,
    sink: Arc<RecordSink>,
}

impl RealtimeKeywordsJob {
    pub const NAME: &'static str = "realtime-keywords";

    pub fn new(
        url: impl Into<String>,
        deps: &CrawlerDeps,
        options: LoadOptions,
        settings: KeywordPanelSettings,
        sink: Arc<RecordSink>,
    ) -> Self {
        // Panels are filled in by script, so wait a fixed delay instead of a selector.
        let options = options.with_readiness(Readiness::Delay(settings.render_delay));
        let chain = ExtractionChain::new(Self::NAME).then(KeywordPanelStrategy::new(settings));

        Self {
            url: url.into(),
            loader: deps.page_loader(),
            options,
            chain,
            sink,
        }
    }
}

#[async_trait]
impl CrawlJob for RealtimeKeywordsJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<JobRunSummary> {
        let page = self.loader.load(&self.url, &self.options).await;
        if !page.succeeded {
            bail!(
                "realtime page {} unavailable after {} attempts",
                self.url,
                page.attempts_used
            );
        }

        let outcome = self.chain.extract(&page.content).await?;
        info!(
            url = %self.url,
            keywords = outcome.output.len(),
            "collected realtime keywords"
        );

        let records: Vec<Record> = outcome.output.into_iter().map(Record::from).collect();
        let report = self.sink.deliver(Self::NAME, records).await;
        Ok(JobRunSummary::from(&report))
    }
}
