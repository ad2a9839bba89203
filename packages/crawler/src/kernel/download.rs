//! Plain HTTP downloads for document attachments.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::BaseDownloader;

/// Browser-like User-Agent; some boards refuse attachment downloads without one.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl BaseDownloader for HttpDownloader {
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP request failed")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("HTTP {} for {}", status, url);
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read response body")?;

        debug!(url = %url, size = bytes.len(), "downloaded attachment");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[tokio::test]
    async fn returns_body_bytes() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/down.do")
                    .query_param("seq", "9")
                    .header("user-agent", USER_AGENT);
                then.status(200).body("HWP DOCUMENT");
            })
            .await;

        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
        let bytes = downloader
            .download(&server.url("/down.do?seq=9"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(bytes, b"HWP DOCUMENT".to_vec());
    }

    #[tokio::test]
    async fn error_status_is_an_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/down.do");
                then.status(404);
            })
            .await;

        let downloader = HttpDownloader::new(Duration::from_secs(5)).unwrap();
        let err = downloader
            .download(&server.url("/down.do"))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("404"));
    }
}
