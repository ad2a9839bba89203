use thiserror::Error;

use crate::kernel::{PageError, ProcessError};

/// Why one extraction strategy produced nothing usable.
///
/// Strategies return these instead of panicking or bubbling `anyhow` errors;
/// the chain driver records them and moves to the next strategy.
#[derive(Debug, Error)]
pub enum ExtractionFailure {
    #[error("page {url} not ready after {attempts} attempts")]
    PageUnavailable { url: String, attempts: u32 },

    #[error("element `{0}` not found")]
    MissingElement(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("document conversion failed: {0}")]
    Conversion(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("strategy produced empty output")]
    Empty,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("cancelled by shutdown")]
    Cancelled,

    #[error(transparent)]
    Page(#[from] PageError),
}

impl ExtractionFailure {
    /// Shutdown, not a problem with the source. The chain stops without falling back.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            ExtractionFailure::Cancelled | ExtractionFailure::Page(PageError::Cancelled)
        )
    }
}

impl From<ProcessError> for ExtractionFailure {
    fn from(e: ProcessError) -> Self {
        ExtractionFailure::Conversion(e.to_string())
    }
}

impl From<std::io::Error> for ExtractionFailure {
    fn from(e: std::io::Error) -> Self {
        ExtractionFailure::Conversion(format!("io: {e}"))
    }
}
