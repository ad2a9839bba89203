//! Attachment download and conversion to text.
//!
//! Two converters fill the same strategy slot:
//!
//! - [`OcrConverter`]: office document → PDF (`soffice`) → page images
//!   (`pdftoppm`) → OCR per page (`tesseract`)
//! - [`Hwp5HtmlConverter`]: HWP → XHTML (`hwp5html`) → text
//!
//! Every external process runs under a timeout inside a scratch directory that
//! is removed when the strategy returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

use super::page_text::visible_text;
use super::{ExtractionFailure, ExtractionStrategy};
use crate::kernel::{run_command, BaseDownloader, LoadOptions, PageLoader};

/// Reference to a detail page that may link a downloadable document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub page_url: String,
}

impl DocumentRef {
    pub fn new(page_url: impl Into<String>) -> Self {
        Self {
            page_url: page_url.into(),
        }
    }
}

#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Name recorded in extraction attempts.
    fn strategy_name(&self) -> &'static str;

    /// Turn `document` into raw text, using `workdir` for intermediates.
    async fn convert(&self, document: &Path, workdir: &Path) -> Result<String, ExtractionFailure>;
}

// =============================================================================
// OCR pipeline
// =============================================================================

pub struct OcrConverter {
    languages: String,
    timeout: Duration,
}

impl OcrConverter {
    pub fn new(languages: impl Into<String>, timeout: Duration) -> Self {
        Self {
            languages: languages.into(),
            timeout,
        }
    }

    async fn to_pdf(&self, document: &Path, workdir: &Path) -> Result<PathBuf, ExtractionFailure> {
        let mut cmd = Command::new("soffice");
        cmd.arg(format!(
            "-env:UserInstallation=file://{}",
            workdir.join("lo-profile").display()
        ))
        .args(["--headless", "--convert-to", "pdf", "--outdir"])
        .arg(workdir)
        .arg(document);
        run_command(cmd, self.timeout).await?;

        let stem = document
            .file_stem()
            .ok_or_else(|| ExtractionFailure::Conversion("document has no file name".into()))?;
        let mut pdf_name = stem.to_os_string();
        pdf_name.push(".pdf");
        let pdf = workdir.join(pdf_name);
        if !tokio::fs::try_exists(&pdf).await.unwrap_or(false) {
            return Err(ExtractionFailure::Conversion(format!(
                "soffice produced no PDF at {}",
                pdf.display()
            )));
        }
        Ok(pdf)
    }

    async fn rasterize(&self, pdf: &Path, workdir: &Path) -> Result<Vec<PathBuf>, ExtractionFailure> {
        let pages_dir = workdir.join("pages");
        tokio::fs::create_dir_all(&pages_dir).await?;

        let mut cmd = Command::new("pdftoppm");
        cmd.args(["-png", "-r", "200"])
            .arg(pdf)
            .arg(pages_dir.join("page"));
        run_command(cmd, self.timeout).await?;

        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(&pages_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "png") {
                images.push(path);
            }
        }
        images.sort_by_key(|p| page_number(p));

        if images.is_empty() {
            return Err(ExtractionFailure::Conversion(
                "PDF rasterized to zero pages".into(),
            ));
        }
        Ok(images)
    }

    async fn recognize(&self, image: &Path) -> Result<String, ExtractionFailure> {
        let mut cmd = Command::new("tesseract");
        cmd.arg(image).arg("stdout").args(["-l", &self.languages]);
        run_command(cmd, self.timeout)
            .await
            .map_err(|e| ExtractionFailure::Ocr(e.to_string()))
    }
}

/// `page-3.png` / `page-03.png` → 3. Unnumbered files sort last.
fn page_number(path: &Path) -> u32 {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.rsplit('-').next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(u32::MAX)
}

#[async_trait]
impl DocumentConverter for OcrConverter {
    fn strategy_name(&self) -> &'static str {
        "document-ocr"
    }

    async fn convert(&self, document: &Path, workdir: &Path) -> Result<String, ExtractionFailure> {
        let pdf = self.to_pdf(document, workdir).await?;
        let images = self.rasterize(&pdf, workdir).await?;

        let mut pages = Vec::with_capacity(images.len());
        for image in &images {
            pages.push(self.recognize(image).await?);
        }
        debug!(pages = pages.len(), "OCR finished");
        Ok(pages.join("\n"))
    }
}

// =============================================================================
// hwp5html pipeline
// =============================================================================

pub struct Hwp5HtmlConverter {
    timeout: Duration,
}

impl Hwp5HtmlConverter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DocumentConverter for Hwp5HtmlConverter {
    fn strategy_name(&self) -> &'static str {
        "hwp5html"
    }

    async fn convert(&self, document: &Path, workdir: &Path) -> Result<String, ExtractionFailure> {
        let out_dir = workdir.join("html");
        let mut cmd = Command::new("hwp5html");
        cmd.arg("--output").arg(&out_dir).arg(document);
        run_command(cmd, self.timeout).await?;

        let xhtml = tokio::fs::read_to_string(out_dir.join("index.xhtml")).await?;
        Ok(xhtml_text(&xhtml))
    }
}

/// Visible text of an XHTML document, one text node per line.
fn xhtml_text(xhtml: &str) -> String {
    let document = Html::parse_document(xhtml);
    let body = Selector::parse("body").ok();
    let root = body
        .as_ref()
        .and_then(|s| document.select(s).next())
        .unwrap_or_else(|| document.root_element());
    visible_text(root)
}

// =============================================================================
// Strategy
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
struct Attachment {
    url: String,
    file_name: String,
}

/// Load the detail page, download its attachment and convert it.
pub struct DocumentConversionStrategy {
    loader: PageLoader,
    options: LoadOptions,
    downloader: Arc<dyn BaseDownloader>,
    converter: Arc<dyn DocumentConverter>,
    attachment_selector: String,
}

impl DocumentConversionStrategy {
    pub fn new(
        loader: PageLoader,
        options: LoadOptions,
        downloader: Arc<dyn BaseDownloader>,
        converter: Arc<dyn DocumentConverter>,
        attachment_selector: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            options,
            downloader,
            converter,
            attachment_selector: attachment_selector.into(),
        }
    }
}

#[async_trait]
impl ExtractionStrategy<DocumentRef, String> for DocumentConversionStrategy {
    fn name(&self) -> &str {
        self.converter.strategy_name()
    }

    async fn extract(&self, input: &DocumentRef) -> Result<String, ExtractionFailure> {
        let page = self.loader.load(&input.page_url, &self.options).await;
        if page.cancelled {
            return Err(ExtractionFailure::Cancelled);
        }
        if !page.succeeded {
            return Err(ExtractionFailure::PageUnavailable {
                url: input.page_url.clone(),
                attempts: page.attempts_used,
            });
        }

        let attachment = find_attachment(
            &page.content.html,
            &self.attachment_selector,
            &input.page_url,
        )?;
        info!(url = %attachment.url, file = %attachment.file_name, "downloading attachment");

        let bytes = self
            .downloader
            .download(&attachment.url)
            .await
            .map_err(|e| ExtractionFailure::Download(format!("{e:#}")))?;

        let workdir = tempfile::tempdir()?;
        let document = workdir.path().join(&attachment.file_name);
        tokio::fs::write(&document, &bytes).await?;

        self.converter.convert(&document, workdir.path()).await
    }
}

fn find_attachment(
    html: &str,
    selector: &str,
    page_url: &str,
) -> Result<Attachment, ExtractionFailure> {
    let parsed = Selector::parse(selector)
        .map_err(|e| ExtractionFailure::Parse(format!("selector {selector}: {e}")))?;
    let document = Html::parse_document(html);

    let link = document
        .select(&parsed)
        .find(|el| el.value().attr("href").is_some())
        .ok_or_else(|| ExtractionFailure::MissingElement(selector.to_string()))?;
    let href = link.value().attr("href").unwrap_or_default();

    let base = Url::parse(page_url).map_err(|e| ExtractionFailure::Parse(e.to_string()))?;
    let url = base
        .join(href)
        .map_err(|e| ExtractionFailure::Parse(format!("attachment href {href}: {e}")))?;

    let label = link.text().collect::<String>();
    Ok(Attachment {
        url: url.to_string(),
        file_name: attachment_file_name(label.trim()),
    })
}

/// Safe local name for a downloaded attachment, keeping its extension.
fn attachment_file_name(label: &str) -> String {
    let base = Path::new(label)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_control() || matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();

    if Path::new(&cleaned).extension().is_some() && !cleaned.starts_with('.') {
        cleaned
    } else {
        "attachment.hwp".to_string()
    }
}
