//! Page loading, extraction fallback and delivery working together.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use crawler_core::common::{JobPostingRecord, KeywordRecord, Record};
use crawler_core::extraction::{
    normalize, DirectPageStrategy, DocumentConversionStrategy, DocumentConverter, DocumentRef,
    ExtractionChain, ExtractionFailure, CONTENT_UNAVAILABLE,
};
use crawler_core::jobs::JobPostingsJob;
use crawler_core::kernel::test_dependencies::{
    BackendCall, MockBackend, MockBrowser, MockDownloader, PageBehavior,
};
use crawler_core::kernel::{LoadOptions, PageLoader, TestDependencies};
use crawler_core::scheduler::parse_utc_offset;
use crawler_core::sink::{ArtifactLog, DeliveryOutcome, RecordSink};
use crawler_core::sources::PostingSettings;
use httpmock::prelude::*;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

/// Converter with a fixed result, standing in for the external tools.
struct StubConverter {
    result: Result<String, String>,
}

#[async_trait]
impl DocumentConverter for StubConverter {
    fn strategy_name(&self) -> &'static str {
        "document-ocr"
    }

    async fn convert(&self, _document: &Path, _workdir: &Path) -> Result<String, ExtractionFailure> {
        self.result.clone().map_err(ExtractionFailure::Ocr)
    }
}

fn sink(backend: Arc<MockBackend>, dir: &tempfile::TempDir) -> RecordSink {
    RecordSink::new(
        backend,
        Arc::new(ArtifactLog::new(dir.path().join("artifacts.tsv"))),
    )
}

fn quick_options() -> LoadOptions {
    LoadOptions {
        settle_delay: Duration::ZERO,
        ..LoadOptions::default()
    }
}

#[tokio::test(start_paused = true)]
async fn hanging_page_is_bounded_and_reported_as_failed() {
    let url = "https://slow.test/realtime";
    let browser = Arc::new(MockBrowser::new().with_behavior(url, PageBehavior::Hang));
    let loader = PageLoader::new(browser.clone(), CancellationToken::new());
    let options = LoadOptions::default().with_selector("div.item");

    let started = tokio::time::Instant::now();
    let result = loader.load(url, &options).await;
    let elapsed = started.elapsed();

    assert!(!result.succeeded);
    assert_eq!(result.attempts_used, 3);
    assert!(
        elapsed <= options.total_budget(),
        "took {elapsed:?}, budget {:?}",
        options.total_budget()
    );
    assert_eq!(browser.navigations(url), 3);
    assert_eq!(browser.sessions_closed(), browser.sessions_opened());
}

#[tokio::test(start_paused = true)]
async fn failed_conversion_falls_back_to_page_text() {
    let page_url = "https://board.test/www/brd/m_4079/view.do?seq=9";
    let file_url = "https://board.test/www/brd/m_4079/down.do?seq=9&file_seq=1";
    let detail = r#"<html><body>
        <div class="bo_con"><p>외교부 채용 공고</p><p>지원 자격</p></div>
        <a href="/www/brd/m_4079/down.do?seq=9&file_seq=1">공고문.hwp</a>
    </body></html>"#;
    let browser = Arc::new(MockBrowser::new().with_page(page_url, detail));
    let downloader = Arc::new(MockDownloader::new().with_file(file_url, b"HWP"));
    let loader = PageLoader::new(browser.clone(), CancellationToken::new());

    let chain = ExtractionChain::new("postings")
        .then(DocumentConversionStrategy::new(
            loader.clone(),
            LoadOptions::default(),
            downloader.clone(),
            Arc::new(StubConverter {
                result: Err("tesseract exited with status 1".to_string()),
            }),
            "a[href*='down.do']",
        ))
        .then(DirectPageStrategy::new(loader, LoadOptions::default(), ".bo_con"))
        .normalize_with(normalize)
        .or_fallback(CONTENT_UNAVAILABLE.to_string());

    let outcome = chain.extract(&DocumentRef::new(page_url)).await.unwrap();

    assert_eq!(outcome.strategy_used, "direct-page");
    assert_eq!(outcome.output, "외교부 채용 공고\n지원 자격");
    assert_eq!(outcome.attempts.len(), 2);
    assert!(!outcome.attempts[0].succeeded);
    assert!(outcome.attempts[0]
        .error
        .as_deref()
        .is_some_and(|e| e.contains("tesseract")));
    assert_eq!(downloader.requests(), vec![file_url.to_string()]);
    assert_eq!(browser.sessions_closed(), browser.sessions_opened());
}

#[tokio::test(start_paused = true)]
async fn unreachable_detail_page_yields_sentinel() {
    let page_url = "https://board.test/www/brd/m_4079/view.do?seq=404";
    let browser = Arc::new(MockBrowser::new().with_behavior(page_url, PageBehavior::Fail));
    let loader = PageLoader::new(browser, CancellationToken::new());

    let chain = ExtractionChain::new("postings")
        .then(DirectPageStrategy::new(loader, LoadOptions::default(), ".bo_con"))
        .or_fallback(CONTENT_UNAVAILABLE.to_string());

    let outcome = chain.extract(&DocumentRef::new(page_url)).await.unwrap();

    assert_eq!(outcome.output, CONTENT_UNAVAILABLE);
    assert_eq!(outcome.strategy_used, "sentinel");
}

#[tokio::test]
async fn repeated_posting_url_is_created_once_then_updated() {
    let backend = Arc::new(MockBackend::new());
    let dir = tempfile::tempdir().unwrap();
    let posting = |title: &str| {
        Record::JobPosting(JobPostingRecord {
            url: "https://board.test/view.do?seq=1".to_string(),
            title: title.to_string(),
            content: "본문".to_string(),
            site: "MOFA 채용정보".to_string(),
        })
    };

    let report = sink(backend.clone(), &dir)
        .deliver("postings", vec![posting("first"), posting("second")])
        .await;

    assert_eq!(report.delivered(), 2);
    assert_eq!(backend.creates().len(), 1);
    assert_eq!(backend.updates().len(), 1);
    assert_eq!(backend.updates()[0].title, "second");
}

#[tokio::test]
async fn one_failing_record_does_not_stop_the_batch() {
    let backend = Arc::new(MockBackend::new().failing_on("둘"));
    let dir = tempfile::tempdir().unwrap();
    let at = Utc.with_ymd_and_hms(2025, 3, 14, 0, 0, 0).unwrap();
    let records: Vec<Record> = ["하나", "둘", "셋"]
        .into_iter()
        .enumerate()
        .map(|(i, keyword)| {
            Record::from(KeywordRecord {
                platform: "nate".to_string(),
                keyword: keyword.to_string(),
                rank: i as u32 + 1,
                collected_at: at,
            })
        })
        .collect();

    let report = sink(backend.clone(), &dir).deliver("keywords", records).await;

    assert_eq!(report.attempted(), 3);
    assert_eq!(report.delivered(), 2);
    assert_eq!(report.failed(), 1);
    let tried: Vec<String> = backend.search_terms().into_iter().map(|t| t.keyword).collect();
    assert_eq!(tried, vec!["하나".to_string(), "둘".to_string(), "셋".to_string()]);
    assert_eq!(report.deliveries[0].outcome, DeliveryOutcome::Created);
    assert!(matches!(
        report.deliveries[1].outcome,
        DeliveryOutcome::Failed(_)
    ));
    assert_eq!(report.deliveries[2].outcome, DeliveryOutcome::Created);
}

fn list_page(rows: &[(u32, &str, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(seq, title, date)| {
            format!(
                r#"<tr><td>{seq}</td><td>채용</td><td><a href="view.do?seq={seq}">{title}</a></td>
                   <td>첨부</td><td>인사과</td><td>{date}</td></tr>"#
            )
        })
        .collect();
    format!(r#"<html><body><table class="tableB"><tbody>{body}</tbody></table></body></html>"#)
}

#[tokio::test]
async fn postings_job_walks_list_pages_and_delivers_today_only() {
    let server = MockServer::start_async().await;
    let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/www/brd/m_4079/list.do")
                .query_param("page", "1");
            then.status(200).header("content-type", "text/html").body(list_page(&[
                (1, "행정원 채용", "2025-03-14"),
                (2, "전문관 채용", "2025-03-14"),
            ]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/www/brd/m_4079/list.do")
                .query_param("page", "2");
            then.status(200).header("content-type", "text/html").body(list_page(&[
                (2, "전문관 채용", "2025-03-14"),
                (3, "지난 공고", "2025-03-13"),
            ]));
        })
        .await;
    // Page 3 is not mocked: the 404 ends the walk.

    let view = |seq: u32| server.url(format!("/www/brd/m_4079/view.do?seq={seq}"));
    let browser = MockBrowser::new()
        .with_page(
            &view(1),
            r#"<html><body><div class="bo_con"><p>행정원   모집</p><p>행정원   모집</p></div></body></html>"#,
        )
        .with_page(
            &view(2),
            r#"<html><body><div class="bo_con">본문</div>
               <a href="down.do?seq=2&file_seq=1">공고문.hwp</a></body></html>"#,
        );
    let downloader =
        MockDownloader::new().with_file(&server.url("/www/brd/m_4079/down.do?seq=2&file_seq=1"), b"HWP");
    let backend = MockBackend::new().with_existing(&view(1));
    let test_deps = TestDependencies::new()
        .mock_browser(browser)
        .mock_downloader(downloader)
        .mock_backend(backend);
    let deps = test_deps.deps();
    let dir = tempfile::tempdir().unwrap();

    let job = JobPostingsJob::new(
        server.base_url(),
        &deps,
        quick_options(),
        Arc::new(StubConverter {
            result: Ok("전문관\u{c}  채용 공고문\r\n\r\n".to_string()),
        }),
        PostingSettings::default(),
        parse_utc_offset("+09:00").unwrap(),
        Arc::new(sink(test_deps.backend.clone(), &dir)),
    );

    let summary = job.run_for(today).await.unwrap();

    assert_eq!(summary.attempted, 2);
    assert_eq!(summary.delivered, 2);

    let updates = test_deps.backend.updates();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].url, view(1));
    assert_eq!(updates[0].content, "행정원 모집");

    let creates = test_deps.backend.creates();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].url, view(2));
    assert_eq!(creates[0].title.as_deref(), Some("전문관 채용"));
    assert_eq!(creates[0].content.as_deref(), Some("전문관 채용 공고문"));
    assert_eq!(creates[0].site, "MOFA 채용정보");
    assert_eq!(creates[0].data_type, "JOB");

    assert!(!test_deps
        .backend
        .calls()
        .iter()
        .any(|c| matches!(c, BackendCall::Check(url) if url.ends_with("seq=3"))));
}

#[tokio::test]
async fn shutdown_mid_run_leaves_stored_postings_untouched() {
    let server = MockServer::start_async().await;
    let today = NaiveDate::from_ymd_opt(2025, 3, 14).unwrap();

    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/www/brd/m_4079/list.do")
                .query_param("page", "1");
            then.status(200)
                .header("content-type", "text/html")
                .body(list_page(&[(1, "행정원 채용", "2025-03-14")]));
        })
        .await;

    let view = server.url("/www/brd/m_4079/view.do?seq=1");
    let browser = MockBrowser::new().with_page(
        &view,
        r#"<html><body><div class="bo_con">행정원 모집</div></body></html>"#,
    );
    let test_deps = TestDependencies::new()
        .mock_browser(browser)
        .mock_backend(MockBackend::new().with_existing(&view));
    let deps = test_deps.deps();
    let dir = tempfile::tempdir().unwrap();

    let job = JobPostingsJob::new(
        server.base_url(),
        &deps,
        quick_options(),
        Arc::new(StubConverter {
            result: Ok("본문".to_string()),
        }),
        PostingSettings {
            max_pages: 1,
            ..PostingSettings::default()
        },
        parse_utc_offset("+09:00").unwrap(),
        Arc::new(sink(test_deps.backend.clone(), &dir)),
    );

    test_deps.shutdown.cancel();
    let err = job.run_for(today).await.unwrap_err();

    assert!(format!("{err:#}").contains("cancelled by shutdown"), "{err:#}");
    assert!(test_deps.backend.calls().is_empty());
    assert_eq!(test_deps.browser.sessions_opened(), 0);
}
