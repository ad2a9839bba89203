//! REST client for the crawl data backend.
//!
//! A minimal client covering the endpoints the crawler writes to: search
//! terms, crawl data (check / create / update), US stock movers, Korean
//! correlation mappings, and presigned upload URLs for binary artifacts.
//!
//! # Example
//!
//! ```rust,ignore
//! use backend_client::{BackendClient, SearchTermPayload};
//!
//! let client = BackendClient::new("http://localhost:3000/api", Duration::from_secs(10))?;
//!
//! client.post_search_term(&SearchTermPayload {
//!     platform: "daum".into(),
//!     keyword: "weather".into(),
//!     rank: 1,
//!     collected_at: chrono::Utc::now(),
//! }).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{BackendError, Result};
pub use types::{
    CrawlDataPayload, CrawlDataUpdate, ExistsResponse, KrMappingPayload, PresignedUrl,
    PresignedUrlRequest, SearchTermPayload, StockMoveType, UsStockPayload,
};

use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        // Validate once so endpoint joins below cannot fail on a bad base.
        Url::parse(base_url)?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Use a preconfigured HTTP client (shared pools, proxies, custom TLS).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!("{}/{}", self.base_url, path))?)
    }

    /// Map a non-2xx response to [`BackendError::Api`].
    async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(BackendError::Api {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn post_json<B: serde::Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let resp = self
            .client
            .post(self.endpoint(path)?)
            .json(body)
            .send()
            .await?;
        Self::ensure_success(resp).await?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let resp = Self::ensure_success(resp).await?;
        Ok(resp.json().await?)
    }

    /// `POST /search-terms`
    pub async fn post_search_term(&self, payload: &SearchTermPayload) -> Result<()> {
        tracing::debug!(platform = %payload.platform, rank = payload.rank, "posting search term");
        self.post_json("search-terms", payload).await
    }

    /// `GET /crawl-data/check?url=...`
    pub async fn crawl_data_exists(&self, url: &str) -> Result<bool> {
        let resp = self
            .client
            .get(self.endpoint("crawl-data/check")?)
            .query(&[("url", url)])
            .send()
            .await?;

        let body: ExistsResponse = Self::read_json(resp).await?;
        Ok(body.exists)
    }

    /// `POST /crawl-data`
    pub async fn create_crawl_data(&self, payload: &CrawlDataPayload) -> Result<()> {
        tracing::debug!(url = %payload.url, site = %payload.site, "creating crawl data");
        self.post_json("crawl-data", payload).await
    }

    /// `PUT /crawl-data`
    pub async fn update_crawl_data(&self, payload: &CrawlDataUpdate) -> Result<()> {
        tracing::debug!(url = %payload.url, "updating crawl data");
        let resp = self
            .client
            .put(self.endpoint("crawl-data")?)
            .json(payload)
            .send()
            .await?;
        Self::ensure_success(resp).await?;
        Ok(())
    }

    /// `POST /stocks/us`
    pub async fn post_us_stock(&self, payload: &UsStockPayload) -> Result<()> {
        tracing::debug!(symbol = %payload.symbol, move_type = payload.move_type.as_str(), "posting stock move");
        self.post_json("stocks/us", payload).await
    }

    /// `POST /stocks/kr-mappings`
    pub async fn post_kr_mapping(&self, payload: &KrMappingPayload) -> Result<()> {
        tracing::debug!(us_symbol = %payload.us_symbol, kr_symbol = %payload.kr_symbol, "posting KR mapping");
        self.post_json("stocks/kr-mappings", payload).await
    }

    /// `POST /s3/presigned-url` for a PUT upload of `key`.
    pub async fn presigned_put_url(&self, key: &str, content_type: &str) -> Result<PresignedUrl> {
        let request = PresignedUrlRequest {
            key: key.to_string(),
            operation: "put".to_string(),
            content_type: content_type.to_string(),
        };

        let resp = self
            .client
            .post(self.endpoint("s3/presigned-url")?)
            .json(&request)
            .send()
            .await?;

        Self::read_json(resp).await
    }

    /// Upload bytes straight to a presigned storage URL (never through the API).
    pub async fn upload_presigned(
        &self,
        presigned_url: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = Url::parse(presigned_url)?;
        let resp = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        Self::ensure_success(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use httpmock::prelude::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn client(server: &MockServer) -> BackendClient {
        BackendClient::new(&server.url("/api"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn rejects_invalid_base_url() {
        let err = BackendClient::new("not a url", Duration::from_secs(1)).err();
        assert!(matches!(err, Some(BackendError::InvalidUrl(_))));
    }

    #[test]
    fn trims_trailing_slash_from_base() {
        let client = BackendClient::new("http://localhost:3000/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:3000/api");
    }

    #[tokio::test]
    async fn posts_search_term_in_camel_case() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/search-terms").json_body(json!({
                "platform": "daum",
                "keyword": "날씨",
                "rank": 1,
                "collectedAt": "2026-10-18T00:00:00Z"
            }));
            then.status(201);
        });

        let payload = SearchTermPayload {
            platform: "daum".into(),
            keyword: "날씨".into(),
            rank: 1,
            collected_at: Utc.with_ymd_and_hms(2026, 10, 18, 0, 0, 0).unwrap(),
        };

        client(&server).post_search_term(&payload).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn check_passes_url_as_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/crawl-data/check")
                .query_param("url", "https://example.org/view.do?seq=1");
            then.status(200).json_body(json!({ "exists": true }));
        });

        let exists = client(&server)
            .crawl_data_exists("https://example.org/view.do?seq=1")
            .await
            .unwrap();

        mock.assert();
        assert!(exists);
    }

    #[tokio::test]
    async fn non_success_status_is_api_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/stocks/us");
            then.status(500).body("boom");
        });

        let payload = UsStockPayload {
            symbol: "AAPL".into(),
            name: "Apple Inc.".into(),
            change: 3.2,
            move_type: StockMoveType::Gainer,
            index: "NASDAQ100".into(),
            date: Utc::now(),
        };

        let err = client(&server).post_us_stock(&payload).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        match err {
            BackendError::Api { message, .. } => assert_eq!(message, "boom"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn posts_kr_mapping_in_camel_case() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/stocks/kr-mappings").json_body(json!({
                "usSymbol": "NVDA",
                "krName": "SK하이닉스",
                "krSymbol": "000660",
                "reason": "HBM supplier",
                "marketType": "KOSPI",
                "correlationType": "SUPPLY_CHAIN"
            }));
            then.status(201);
        });

        let payload = KrMappingPayload {
            us_symbol: "NVDA".into(),
            kr_name: "SK하이닉스".into(),
            kr_symbol: "000660".into(),
            reason: "HBM supplier".into(),
            market_type: "KOSPI".into(),
            correlation_type: "SUPPLY_CHAIN".into(),
        };

        client(&server).post_kr_mapping(&payload).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn omits_missing_optional_crawl_fields() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/api/crawl-data").json_body(json!({
                "site": "MOFA",
                "url": "https://example.org/1",
                "type": "JOB"
            }));
            then.status(201);
        });

        let payload = CrawlDataPayload {
            site: "MOFA".into(),
            url: "https://example.org/1".into(),
            data_type: "JOB".into(),
            title: None,
            content: None,
        };

        client(&server).create_crawl_data(&payload).await.unwrap();
        mock.assert();
    }

    #[tokio::test]
    async fn presigned_upload_round_trip() {
        let server = MockServer::start();
        let presign = server.mock(|when, then| {
            when.method(POST).path("/api/s3/presigned-url").json_body(json!({
                "key": "heatmap/2026-10-18.png",
                "type": "put",
                "contentType": "image/png"
            }));
            then.status(201)
                .json_body(json!({ "url": server.url("/bucket/heatmap.png?sig=abc") }));
        });
        let upload = server.mock(|when, then| {
            when.method(PUT)
                .path("/bucket/heatmap.png")
                .header("content-type", "image/png")
                .body("png-bytes");
            then.status(200);
        });

        let client = client(&server);
        let presigned = client
            .presigned_put_url("heatmap/2026-10-18.png", "image/png")
            .await
            .unwrap();
        client
            .upload_presigned(&presigned.url, b"png-bytes".to_vec(), "image/png")
            .await
            .unwrap();

        presign.assert();
        upload.assert();
    }
}
