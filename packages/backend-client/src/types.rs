use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /search-terms`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchTermPayload {
    pub platform: String,
    pub keyword: String,
    pub rank: u32,
    #[serde(rename = "collectedAt")]
    pub collected_at: DateTime<Utc>,
}

/// Response of `GET /crawl-data/check`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

/// Body of `POST /crawl-data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlDataPayload {
    pub site: String,
    pub url: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Body of `PUT /crawl-data`. Only title and content are mutable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlDataUpdate {
    pub url: String,
    pub title: String,
    pub content: String,
}

/// Mover direction as the backend spells it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StockMoveType {
    Gainer,
    Loser,
}

impl StockMoveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StockMoveType::Gainer => "GAINER",
            StockMoveType::Loser => "LOSER",
        }
    }
}

/// Body of `POST /stocks/us`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsStockPayload {
    pub symbol: String,
    pub name: String,
    pub change: f64,
    #[serde(rename = "type")]
    pub move_type: StockMoveType,
    pub index: String,
    pub date: DateTime<Utc>,
}

/// Body of `POST /stocks/kr-mappings`: a Korean listing correlated with a US symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KrMappingPayload {
    pub us_symbol: String,
    pub kr_name: String,
    pub kr_symbol: String,
    pub reason: String,
    /// `KOSPI` or `KOSDAQ`.
    pub market_type: String,
    pub correlation_type: String,
}

/// Body of `POST /s3/presigned-url`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresignedUrlRequest {
    pub key: String,
    #[serde(rename = "type")]
    pub operation: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
}

/// Response of `POST /s3/presigned-url`.
#[derive(Debug, Clone, Deserialize)]
pub struct PresignedUrl {
    pub url: String,
}
