use async_trait::async_trait;

use crate::error::Result;
use crate::types::PhotosResponse;

/// A remote listing of photos addressed by 1-based page number.
///
/// Calls for the same `(per_page, page)` are idempotent at a fixed point in
/// time; the content behind them may change between calls.
#[async_trait]
pub trait ListingSource: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn fetch_page(&self, api_key: &str, per_page: u32, page: u32) -> Result<PhotosResponse>;
}
