//! `BaseBackendApi` backed by the REST client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use backend_client::{
    BackendClient, CrawlDataPayload, CrawlDataUpdate, SearchTermPayload, UsStockPayload,
};

use super::BaseBackendApi;

#[async_trait]
impl BaseBackendApi for BackendClient {
    async fn post_search_term(&self, payload: &SearchTermPayload) -> Result<()> {
        BackendClient::post_search_term(self, payload)
            .await
            .context("POST /search-terms failed")
    }

    async fn crawl_data_exists(&self, url: &str) -> Result<bool> {
        BackendClient::crawl_data_exists(self, url)
            .await
            .context("GET /crawl-data/check failed")
    }

    async fn create_crawl_data(&self, payload: &CrawlDataPayload) -> Result<()> {
        BackendClient::create_crawl_data(self, payload)
            .await
            .context("POST /crawl-data failed")
    }

    async fn update_crawl_data(&self, payload: &CrawlDataUpdate) -> Result<()> {
        BackendClient::update_crawl_data(self, payload)
            .await
            .context("PUT /crawl-data failed")
    }

    async fn post_us_stock(&self, payload: &UsStockPayload) -> Result<()> {
        BackendClient::post_us_stock(self, payload)
            .await
            .context("POST /stocks/us failed")
    }

    async fn presigned_put_url(&self, key: &str, content_type: &str) -> Result<String> {
        let presigned = BackendClient::presigned_put_url(self, key, content_type)
            .await
            .context("POST /s3/presigned-url failed")?;
        Ok(presigned.url)
    }

    async fn upload_presigned(&self, url: &str, bytes: Vec<u8>, content_type: &str) -> Result<()> {
        BackendClient::upload_presigned(self, url, bytes, content_type)
            .await
            .context("presigned upload failed")
    }
}
