//! HeatmapJob - daily capture of the sector heatmap canvas.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, Utc};
use tracing::{info, warn};

use crate::common::{ImageArtifact, Record};
use crate::extraction::{CanvasCaptureStrategy, CapturedImage, ExtractionChain};
use crate::kernel::{CrawlerDeps, LoadOptions, PageGuard, PageLoader};
use crate::scheduler::{CrawlJob, JobRunSummary};
use crate::sink::RecordSink;
use crate::sources::HeatmapSettings;

const CONTENT_TYPE: &str = "image/png";

pub struct HeatmapJob {
    url: String,
    loader: PageLoader,
    options: LoadOptions,
    upload_prefix: String,
    offset: FixedOffset,
    chain: ExtractionChain<PageGuard, CapturedImage>,
    sink: Arc<RecordSink>,
}

impl HeatmapJob {
    pub const NAME: &'static str = "heatmap";

    pub fn new(
        base_url: &str,
        deps: &CrawlerDeps,
        options: LoadOptions,
        settings: HeatmapSettings,
        offset: FixedOffset,
        sink: Arc<RecordSink>,
    ) -> Self {
        let url = format!("{}{}", base_url.trim_end_matches('/'), settings.path);
        let options = options.with_selector(settings.canvas_selector.clone());
        let upload_prefix = settings.upload_prefix.clone();
        let chain = ExtractionChain::new(Self::NAME).then(CanvasCaptureStrategy::new(settings));

        Self {
            url,
            loader: deps.page_loader(),
            options,
            upload_prefix,
            offset,
            chain,
            sink,
        }
    }

    pub fn file_name(date: NaiveDate) -> String {
        format!("finviz_map_{}.png", date.format("%Y-%m-%d"))
    }

    async fn capture(&self) -> Result<CapturedImage> {
        let acquired = self.loader.acquire(&self.url, &self.options).await;
        let Some(page) = acquired.page else {
            bail!(
                "heatmap page {} unavailable after {} attempts",
                self.url,
                acquired.attempts_used
            );
        };
        if !acquired.succeeded {
            page.close().await;
            bail!(
                "heatmap canvas never appeared on {} after {} attempts",
                self.url,
                acquired.attempts_used
            );
        }

        let outcome = self.chain.extract(&page).await;
        page.close().await;
        Ok(outcome?.output)
    }
}

#[async_trait]
impl CrawlJob for HeatmapJob {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<JobRunSummary> {
        let image = self.capture().await?;

        let file_name = Self::file_name(Utc::now().with_timezone(&self.offset).date_naive());
        let workdir = tempfile::tempdir().context("Failed to create capture directory")?;
        let path = workdir.path().join(&file_name);
        tokio::fs::write(&path, &image.bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(file = %file_name, bytes = image.bytes.len(), "heatmap captured");

        let record = Record::from(ImageArtifact {
            path,
            upload_key: format!("{}/{}", self.upload_prefix, file_name),
            content_type: CONTENT_TYPE.to_string(),
        });
        let report = self.sink.deliver(Self::NAME, vec![record]).await;

        if let Err(e) = workdir.close() {
            warn!(error = %e, "failed to remove capture directory");
        }
        Ok(JobRunSummary::from(&report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{BackendCall, MockBrowser};
    use crate::kernel::TestDependencies;
    use crate::scheduler::parse_utc_offset;
    use crate::sink::ArtifactLog;

    const BASE: &str = "https://maps.test";
    const MAP: &str = r#"<html><body><canvas class="hover-canvas"></canvas></body></html>"#;

    fn job(test_deps: &TestDependencies, dir: &tempfile::TempDir) -> HeatmapJob {
        let deps = test_deps.deps();
        let sink = Arc::new(RecordSink::new(
            deps.backend.clone(),
            Arc::new(ArtifactLog::new(dir.path().join("artifacts.tsv"))),
        ));
        HeatmapJob::new(
            BASE,
            &deps,
            LoadOptions::default(),
            HeatmapSettings::default(),
            parse_utc_offset("+09:00").unwrap(),
            sink,
        )
    }

    #[test]
    fn file_name_uses_the_date() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();
        assert_eq!(HeatmapJob::file_name(date), "finviz_map_2025-03-14.png");
    }

    #[tokio::test(start_paused = true)]
    async fn capture_is_uploaded_and_logged() {
        let browser = MockBrowser::new()
            .with_page(&format!("{BASE}/map.ashx?t=sec"), MAP)
            .with_screenshot(vec![7; 64]);
        let test_deps = TestDependencies::new().mock_browser(browser);
        let dir = tempfile::tempdir().unwrap();

        let summary = job(&test_deps, &dir).run().await.unwrap();

        assert_eq!(summary.delivered, 1);
        let calls = test_deps.backend.calls();
        assert!(matches!(
            &calls[0],
            BackendCall::Presign { key, content_type }
                if key.starts_with("heatmaps/finviz_map_") && content_type == "image/png"
        ));
        assert!(matches!(&calls[1], BackendCall::Upload { size: 64, .. }));
        assert_eq!(test_deps.browser.sessions_closed(), test_deps.browser.sessions_opened());

        let log = std::fs::read_to_string(dir.path().join("artifacts.tsv")).unwrap();
        assert!(log.contains("https://storage.test/heatmaps/finviz_map_"));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_canvas_uploads_nothing() {
        let browser = MockBrowser::new().with_page(
            &format!("{BASE}/map.ashx?t=sec"),
            "<html><body>blocked</body></html>",
        );
        let test_deps = TestDependencies::new().mock_browser(browser);
        let dir = tempfile::tempdir().unwrap();

        assert!(job(&test_deps, &dir).run().await.is_err());
        assert!(test_deps.backend.calls().is_empty());
        assert_eq!(test_deps.browser.sessions_closed(), test_deps.browser.sessions_opened());
    }
}
