//! Extraction strategies and the fallback chain that drives them.

pub mod canvas;
pub mod chain;
pub mod document;
pub mod error;
pub mod listings;
pub mod page_text;
pub mod text;

pub use canvas::{CanvasCaptureStrategy, CapturedImage};
pub use chain::{
    ChainError, ChainOutcome, ExtractionAttempt, ExtractionChain, ExtractionStrategy, Payload,
    SENTINEL_STRATEGY,
};
pub use document::{
    DocumentConversionStrategy, DocumentConverter, DocumentRef, Hwp5HtmlConverter, OcrConverter,
};
pub use error::ExtractionFailure;
pub use listings::{
    parse_keyword_panels, parse_posting_list, parse_screener_table, KeywordPanelStrategy,
    PostingSummary, ScreenerTableStrategy,
};
pub use page_text::DirectPageStrategy;
pub use text::{normalize, CONTENT_UNAVAILABLE};
