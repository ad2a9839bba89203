//! Normalized records produced by jobs and consumed by the record sink.
//!
//! Each variant has a fixed field set and a natural key the sink uses for
//! dedup. Conversion to backend wire types happens only in `sink`.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, FixedOffset, Utc};

/// One ranked search term from a realtime keyword panel.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordRecord {
    pub platform: String,
    pub keyword: String,
    pub rank: u32,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveDirection {
    Gainer,
    Loser,
}

impl fmt::Display for MoveDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveDirection::Gainer => write!(f, "gainer"),
            MoveDirection::Loser => write!(f, "loser"),
        }
    }
}

/// One row of a gainers/losers screener.
#[derive(Debug, Clone, PartialEq)]
pub struct StockMoveRecord {
    pub symbol: String,
    pub name: String,
    pub change_percent: f64,
    pub direction: MoveDirection,
    pub index: String,
    /// Capture time in the schedule's offset; its calendar date keys the record.
    pub observed_at: DateTime<FixedOffset>,
}

/// A job posting; the URL is its natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct JobPostingRecord {
    pub url: String,
    pub title: String,
    pub content: String,
    pub site: String,
}

/// A binary artifact on local disk waiting for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageArtifact {
    pub path: PathBuf,
    pub upload_key: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Keyword(KeywordRecord),
    StockMove(StockMoveRecord),
    JobPosting(JobPostingRecord),
    Image(ImageArtifact),
}

/// Identity used by the sink for dedup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Record {
    pub fn natural_key(&self) -> NaturalKey {
        let key = match self {
            Record::Keyword(k) => format!(
                "keyword:{}:{}:{}",
                k.platform,
                k.rank,
                k.collected_at.to_rfc3339()
            ),
            Record::StockMove(s) => format!(
                "stock:{}:{}:{}",
                s.symbol,
                s.observed_at.date_naive(),
                s.direction
            ),
            Record::JobPosting(p) => format!("posting:{}", p.url),
            Record::Image(i) => format!("image:{}", i.upload_key),
        };
        NaturalKey(key)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Record::Keyword(_) => "keyword",
            Record::StockMove(_) => "stock_move",
            Record::JobPosting(_) => "job_posting",
            Record::Image(_) => "image",
        }
    }
}

impl From<KeywordRecord> for Record {
    fn from(value: KeywordRecord) -> Self {
        Record::Keyword(value)
    }
}

impl From<StockMoveRecord> for Record {
    fn from(value: StockMoveRecord) -> Self {
        Record::StockMove(value)
    }
}

impl From<JobPostingRecord> for Record {
    fn from(value: JobPostingRecord) -> Self {
        Record::JobPosting(value)
    }
}

impl From<ImageArtifact> for Record {
    fn from(value: ImageArtifact) -> Self {
        Record::Image(value)
    }
}
