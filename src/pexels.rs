use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::{FeedError, Result};
use crate::source::ListingSource;
use crate::types::PhotosResponse;

pub struct Pexels {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for Pexels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pexels")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Pexels {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1{}", self.base_url, path)
    }
}

#[async_trait]
impl ListingSource for Pexels {
    fn name(&self) -> &str {
        "Pexels"
    }

    async fn fetch_page(&self, api_key: &str, per_page: u32, page: u32) -> Result<PhotosResponse> {
        let url = self.api_url("/curated");
        tracing::debug!(%url, per_page, page, "fetching curated page");

        let response = self
            .client
            .get(&url)
            .header("Authorization", api_key)
            .query(&[("per_page", per_page), ("page", page)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(FeedError::Transport(format!("Pexels API {}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }
}
