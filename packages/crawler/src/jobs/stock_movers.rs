//! StockMoversJob - top gainers and losers from screener tables.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::FixedOffset;
use tracing::{info, warn};

use crate::common::{Record, StockMoveRecord};
use crate::extraction::{ExtractionChain, ScreenerTableStrategy};
use crate::kernel::{CrawlerDeps, LoadOptions, PageLoader};
use crate::scheduler::{CrawlJob, JobRunSummary};
use crate::sink::RecordSink;
use crate::sources::{nasdaq_screens, sp500_screens, ScreenerSettings, StockScreen};

pub struct StockMoversJob {
    name: String,
    base_url: String,
    screens: Vec<StockScreen>,
    loader: PageLoader,
    options: LoadOptions,
    settings: ScreenerSettings,
    offset: FixedOffset,
    sink: Arc<RecordSink>,
}

impl StockMoversJob {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        screens: Vec<StockScreen>,
        deps: &CrawlerDeps,
        options: LoadOptions,
        settings: ScreenerSettings,
        offset: FixedOffset,
        sink: Arc<RecordSink>,
    ) -> Self {
        let options = options.with_selector(settings.table_selector.clone());
        Self {
            name: name.into(),
            base_url: base_url.into(),
            screens,
            loader: deps.page_loader(),
            options,
            settings,
            offset,
            sink,
        }
    }

    pub fn nasdaq(
        base_url: impl Into<String>,
        deps: &CrawlerDeps,
        options: LoadOptions,
        offset: FixedOffset,
        sink: Arc<RecordSink>,
    ) -> Self {
        Self::new(
            "nasdaq-movers",
            base_url,
            nasdaq_screens(),
            deps,
            options,
            ScreenerSettings::default(),
            offset,
            sink,
        )
    }

    pub fn sp500(
        base_url: impl Into<String>,
        deps: &CrawlerDeps,
        options: LoadOptions,
        offset: FixedOffset,
        sink: Arc<RecordSink>,
    ) -> Self {
        Self::new(
            "sp500-movers",
            base_url,
            sp500_screens(),
            deps,
            options,
            ScreenerSettings::default(),
            offset,
            sink,
        )
    }

    fn screen_url(&self, screen: &StockScreen) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), screen.path)
    }

    async fn collect(&self, screen: &StockScreen) -> Result<Vec<StockMoveRecord>> {
        let url = self.screen_url(screen);
        let page = self.loader.load(&url, &self.options).await;
        if !page.succeeded {
            bail!("screener {} unavailable after {} attempts", url, page.attempts_used);
        }

        let chain = ExtractionChain::new(format!("{}:{}", self.name, screen.direction)).then(
            ScreenerTableStrategy::new(
                self.settings.clone(),
                screen.direction,
                &screen.index,
                self.offset,
            ),
        );
        let outcome = chain.extract(&page.content).await?;
        Ok(outcome.output)
    }
}

#[async_trait]
impl CrawlJob for StockMoversJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self) -> Result<JobRunSummary> {
        let mut records = Vec::new();
        let mut failed_screens = 0;

        for screen in &self.screens {
            match self.collect(screen).await {
                Ok(rows) => {
                    info!(
                        job = %self.name,
                        direction = %screen.direction,
                        rows = rows.len(),
                        "collected screener rows"
                    );
                    records.extend(rows.into_iter().map(Record::from));
                }
                Err(e) => {
                    warn!(
                        job = %self.name,
                        direction = %screen.direction,
                        error = %format!("{e:#}"),
                        "screener failed"
                    );
                    failed_screens += 1;
                }
            }
        }

        if failed_screens == self.screens.len() && !self.screens.is_empty() {
            bail!("every screener for {} failed", self.name);
        }

        let report = self.sink.deliver(&self.name, records).await;
        Ok(JobRunSummary::from(&report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::MoveDirection;
    use crate::kernel::test_dependencies::{MockBrowser, PageBehavior};
    use crate::kernel::TestDependencies;
    use crate::scheduler::parse_utc_offset;
    use crate::sink::ArtifactLog;
    use backend_client::StockMoveType;

    const BASE: &str = "https://screener.test";

    fn table(rows: &[(&str, &str, &str)]) -> String {
        let body: String = rows
            .iter()
            .enumerate()
            .map(|(i, (symbol, name, change))| {
                format!(
                    "<tr><td>{}</td><td>{symbol}</td><td>{name}</td><td></td><td></td>\
                     <td></td><td></td><td></td><td></td><td>{change}</td></tr>",
                    i + 1
                )
            })
            .collect();
        format!(
            r#"<html><body><table class="styled-table-new"><thead><tr><th>No.</th></tr></thead>
            <tbody>{body}</tbody></table></body></html>"#
        )
    }

    fn job(test_deps: &TestDependencies, dir: &tempfile::TempDir) -> StockMoversJob {
        let deps = test_deps.deps();
        let sink = Arc::new(RecordSink::new(
            deps.backend.clone(),
            Arc::new(ArtifactLog::new(dir.path().join("artifacts.tsv"))),
        ));
        StockMoversJob::nasdaq(
            format!("{BASE}/"),
            &deps,
            LoadOptions::default(),
            parse_utc_offset("+09:00").unwrap(),
            sink,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn gainers_and_losers_are_delivered_with_direction() {
        let screens = nasdaq_screens();
        let browser = MockBrowser::new()
            .with_page(
                &format!("{BASE}{}", screens[0].path),
                &table(&[("NVDA", "NVIDIA Corp", "12.50%"), ("AMD", "AMD Inc", "8.10%")]),
            )
            .with_page(
                &format!("{BASE}{}", screens[1].path),
                &table(&[("INTC", "Intel Corp", "-9.75%")]),
            );
        let test_deps = TestDependencies::new().mock_browser(browser);
        let dir = tempfile::tempdir().unwrap();

        let summary = job(&test_deps, &dir).run().await.unwrap();

        assert_eq!(summary.delivered, 3);
        let stocks = test_deps.backend.stocks();
        assert_eq!(stocks[0].symbol, "NVDA");
        assert_eq!(stocks[0].move_type, StockMoveType::Gainer);
        assert_eq!(stocks[2].symbol, "INTC");
        assert_eq!(stocks[2].move_type, StockMoveType::Loser);
        assert_eq!(stocks[2].change, -9.75);
        assert_eq!(stocks[2].index, "NASDAQ100");
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_screen_does_not_block_the_other() {
        let screens = nasdaq_screens();
        let browser = MockBrowser::new()
            .with_page(
                &format!("{BASE}{}", screens[0].path),
                &table(&[("NVDA", "NVIDIA Corp", "12.50%")]),
            )
            .with_behavior(&format!("{BASE}{}", screens[1].path), PageBehavior::Fail);
        let test_deps = TestDependencies::new().mock_browser(browser);
        let dir = tempfile::tempdir().unwrap();

        let summary = job(&test_deps, &dir).run().await.unwrap();

        assert_eq!(summary.delivered, 1);
        assert_eq!(test_deps.backend.stocks()[0].move_type, StockMoveType::Gainer);
    }

    #[tokio::test(start_paused = true)]
    async fn all_screens_failing_fails_the_run() {
        let test_deps = TestDependencies::new();
        let dir = tempfile::tempdir().unwrap();

        assert!(job(&test_deps, &dir).run().await.is_err());
        assert!(test_deps.backend.calls().is_empty());
    }

    #[test]
    fn screen_urls_join_without_double_slash() {
        let test_deps = TestDependencies::new();
        let dir = tempfile::tempdir().unwrap();
        let job = job(&test_deps, &dir);
        let screen = StockScreen {
            path: "/screener.ashx?v=111".to_string(),
            direction: MoveDirection::Gainer,
            index: "SP500".to_string(),
        };
        assert_eq!(job.screen_url(&screen), "https://screener.test/screener.ashx?v=111");
    }
}
