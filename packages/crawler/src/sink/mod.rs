//! Record delivery to the backend.
//!
//! Delivery is at-least-once with dedup by natural key:
//!
//! - postings: existence check by URL, then update (title/content) or create.
//!   A URL repeated inside one batch is updated, never created twice.
//! - keywords and stock moves: straight create; in-batch repeats are skipped.
//! - images: presigned URL from the backend, direct upload to storage, then a
//!   row in the artifact log.
//!
//! A failing record is logged and reported; the rest of the batch continues.

pub mod artifacts;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use backend_client::{
    CrawlDataPayload, CrawlDataUpdate, SearchTermPayload, StockMoveType, UsStockPayload,
};
use chrono::Utc;
use tracing::{debug, info, warn};

pub use artifacts::{ArtifactEntry, ArtifactLog};

use crate::common::{
    ImageArtifact, JobPostingRecord, KeywordRecord, MoveDirection, NaturalKey, Record,
    StockMoveRecord,
};
use crate::kernel::BaseBackendApi;

/// `type` sent with every posting create.
pub const POSTING_DATA_TYPE: &str = "JOB";

#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Created,
    Updated,
    Uploaded { url: String },
    SkippedDuplicate,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(
            self,
            DeliveryOutcome::Created | DeliveryOutcome::Updated | DeliveryOutcome::Uploaded { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct RecordDelivery {
    pub key: NaturalKey,
    pub kind: &'static str,
    pub outcome: DeliveryOutcome,
}

/// Per-record result of one `deliver` call.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub source: String,
    pub deliveries: Vec<RecordDelivery>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.deliveries.len()
    }

    pub fn delivered(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.outcome.is_delivered())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| matches!(d.outcome, DeliveryOutcome::Failed(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.deliveries
            .iter()
            .filter(|d| d.outcome == DeliveryOutcome::SkippedDuplicate)
            .count()
    }
}

pub struct RecordSink {
    api: Arc<dyn BaseBackendApi>,
    artifacts: Arc<ArtifactLog>,
}

impl RecordSink {
    pub fn new(api: Arc<dyn BaseBackendApi>, artifacts: Arc<ArtifactLog>) -> Self {
        Self { api, artifacts }
    }

    pub async fn deliver(&self, source: &str, records: Vec<Record>) -> DeliveryReport {
        // Per-batch dedup index: key -> delivered successfully earlier in this batch.
        let mut seen: HashMap<NaturalKey, bool> = HashMap::new();
        let mut deliveries = Vec::with_capacity(records.len());

        for record in records {
            let key = record.natural_key();
            let kind = record.kind();
            let already_delivered = seen.get(&key).copied().unwrap_or(false);

            let result = match &record {
                Record::JobPosting(posting) if already_delivered => {
                    self.update_posting(posting).await
                }
                _ if already_delivered => {
                    debug!(source = %source, key = %key, "duplicate record in batch, skipping");
                    Ok(DeliveryOutcome::SkippedDuplicate)
                }
                Record::Keyword(keyword) => self.create_keyword(keyword).await,
                Record::StockMove(stock) => self.create_stock(stock).await,
                Record::JobPosting(posting) => self.upsert_posting(posting).await,
                Record::Image(image) => self.upload_image(source, image).await,
            };

            let outcome = match result {
                Ok(outcome) => {
                    seen.insert(key.clone(), true);
                    outcome
                }
                Err(e) => {
                    let message = format!("{e:#}");
                    warn!(source = %source, key = %key, error = %message, "record delivery failed");
                    seen.entry(key.clone()).or_insert(false);
                    DeliveryOutcome::Failed(message)
                }
            };

            deliveries.push(RecordDelivery { key, kind, outcome });
        }

        let report = DeliveryReport {
            source: source.to_string(),
            deliveries,
        };
        info!(
            source = %source,
            attempted = report.attempted(),
            delivered = report.delivered(),
            failed = report.failed(),
            skipped = report.skipped(),
            "delivery finished"
        );
        report
    }

    async fn create_keyword(&self, record: &KeywordRecord) -> Result<DeliveryOutcome> {
        self.api
            .post_search_term(&SearchTermPayload {
                platform: record.platform.clone(),
                keyword: record.keyword.clone(),
                rank: record.rank,
                collected_at: record.collected_at,
            })
            .await?;
        Ok(DeliveryOutcome::Created)
    }

    async fn create_stock(&self, record: &StockMoveRecord) -> Result<DeliveryOutcome> {
        let move_type = match record.direction {
            MoveDirection::Gainer => StockMoveType::Gainer,
            MoveDirection::Loser => StockMoveType::Loser,
        };
        self.api
            .post_us_stock(&UsStockPayload {
                symbol: record.symbol.clone(),
                name: record.name.clone(),
                change: record.change_percent,
                move_type,
                index: record.index.clone(),
                date: record.observed_at.with_timezone(&Utc),
            })
            .await?;
        Ok(DeliveryOutcome::Created)
    }

    async fn upsert_posting(&self, record: &JobPostingRecord) -> Result<DeliveryOutcome> {
        if self.api.crawl_data_exists(&record.url).await? {
            return self.update_posting(record).await;
        }

        self.api
            .create_crawl_data(&CrawlDataPayload {
                site: record.site.clone(),
                url: record.url.clone(),
                data_type: POSTING_DATA_TYPE.to_string(),
                title: Some(record.title.clone()),
                content: Some(record.content.clone()),
            })
            .await?;
        Ok(DeliveryOutcome::Created)
    }

    async fn update_posting(&self, record: &JobPostingRecord) -> Result<DeliveryOutcome> {
        self.api
            .update_crawl_data(&CrawlDataUpdate {
                url: record.url.clone(),
                title: record.title.clone(),
                content: record.content.clone(),
            })
            .await?;
        Ok(DeliveryOutcome::Updated)
    }

    async fn upload_image(&self, source: &str, image: &ImageArtifact) -> Result<DeliveryOutcome> {
        let presigned = self
            .api
            .presigned_put_url(&image.upload_key, &image.content_type)
            .await?;
        let bytes = tokio::fs::read(&image.path)
            .await
            .with_context(|| format!("Failed to read {}", image.path.display()))?;

        self.api
            .upload_presigned(&presigned, bytes, &image.content_type)
            .await?;

        let url = public_url(&presigned);
        self.artifacts
            .append(&ArtifactEntry {
                recorded_at: Utc::now(),
                source: source.to_string(),
                key: image.upload_key.clone(),
                url: url.clone(),
            })
            .await?;

        Ok(DeliveryOutcome::Uploaded { url })
    }
}

/// Presigned URL without its signature query.
fn public_url(presigned: &str) -> String {
    presigned
        .split_once('?')
        .map(|(base, _)| base)
        .unwrap_or(presigned)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{BackendCall, MockBackend};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sink(backend: Arc<MockBackend>, dir: &tempfile::TempDir) -> RecordSink {
        RecordSink::new(
            backend,
            Arc::new(ArtifactLog::new(dir.path().join("artifacts.tsv"))),
        )
    }

    fn keyword(keyword: &str, rank: u32) -> Record {
        Record::Keyword(KeywordRecord {
            platform: "daum".to_string(),
            keyword: keyword.to_string(),
            rank,
            collected_at: Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap(),
        })
    }

    fn posting(url: &str, title: &str) -> Record {
        Record::JobPosting(JobPostingRecord {
            url: url.to_string(),
            title: title.to_string(),
            content: "본문".to_string(),
            site: "board".to_string(),
        })
    }

    #[test]
    fn public_url_drops_signature() {
        assert_eq!(
            public_url("https://bucket.test/heatmaps/a.png?X-Amz-Signature=abc"),
            "https://bucket.test/heatmaps/a.png"
        );
        assert_eq!(public_url("https://bucket.test/a.png"), "https://bucket.test/a.png");
    }

    #[tokio::test]
    async fn existing_posting_is_updated_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new().with_existing("https://board.test/1"));

        let report = sink(backend.clone(), &dir)
            .deliver("postings", vec![posting("https://board.test/1", "new title")])
            .await;

        assert_eq!(report.deliveries[0].outcome, DeliveryOutcome::Updated);
        assert!(backend.creates().is_empty());
        assert_eq!(backend.updates()[0].title, "new title");
    }

    #[tokio::test]
    async fn repeated_keyword_in_batch_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());

        let report = sink(backend.clone(), &dir)
            .deliver("realtime", vec![keyword("날씨", 1), keyword("날씨", 1), keyword("환율", 2)])
            .await;

        assert_eq!(report.attempted(), 3);
        assert_eq!(report.delivered(), 2);
        assert_eq!(report.skipped(), 1);
        assert_eq!(backend.search_terms().len(), 2);
    }

    #[tokio::test]
    async fn failed_record_is_retried_when_repeated() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new().failing_on("날씨"));

        let report = sink(backend.clone(), &dir)
            .deliver("realtime", vec![keyword("날씨", 1), keyword("날씨", 1)])
            .await;

        assert_eq!(report.failed(), 2);
        assert_eq!(backend.search_terms().len(), 2);
    }

    #[tokio::test]
    async fn image_is_uploaded_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let image_path = dir.path().join("map.png");
        tokio::fs::write(&image_path, b"png-bytes").await.unwrap();
        let backend = Arc::new(MockBackend::new());
        let sink = sink(backend.clone(), &dir);

        let report = sink
            .deliver(
                "heatmap",
                vec![Record::Image(ImageArtifact {
                    path: image_path,
                    upload_key: "heatmaps/map.png".to_string(),
                    content_type: "image/png".to_string(),
                })],
            )
            .await;

        assert_eq!(
            report.deliveries[0].outcome,
            DeliveryOutcome::Uploaded {
                url: "https://storage.test/heatmaps/map.png".to_string()
            }
        );
        assert_eq!(
            backend.calls(),
            vec![
                BackendCall::Presign {
                    key: "heatmaps/map.png".to_string(),
                    content_type: "image/png".to_string(),
                },
                BackendCall::Upload {
                    url: "https://storage.test/heatmaps/map.png?X-Amz-Signature=mock".to_string(),
                    size: 9,
                },
            ]
        );
        let log = tokio::fs::read_to_string(dir.path().join("artifacts.tsv"))
            .await
            .unwrap();
        assert!(log.lines().nth(1).unwrap().ends_with(
            "\theatmap\theatmaps/map.png\thttps://storage.test/heatmaps/map.png"
        ));
    }

    #[tokio::test]
    async fn missing_image_file_fails_that_record_only() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::new());

        let report = sink(backend.clone(), &dir)
            .deliver(
                "heatmap",
                vec![
                    Record::Image(ImageArtifact {
                        path: dir.path().join("missing.png"),
                        upload_key: "heatmaps/missing.png".to_string(),
                        content_type: "image/png".to_string(),
                    }),
                    keyword("날씨", 1),
                ],
            )
            .await;

        assert!(matches!(report.deliveries[0].outcome, DeliveryOutcome::Failed(_)));
        assert_eq!(report.deliveries[1].outcome, DeliveryOutcome::Created);
    }
}
