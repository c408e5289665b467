use crate::oai::ListRecordsRequest;
use crate::types::{Record, Result};
use async_trait::async_trait;
use std::time::Duration;

/// Outcome of a single page request that reached the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResponse {
    /// Response body of a successful request
    Body(String),
    /// The service asked us to slow down, optionally saying for how long
    RateLimited { retry_after: Option<Duration> },
}

/// Transport for `ListRecords` pages.
///
/// Errors returned here are classified with `HarvestError::is_transient`
/// by the harvester; rate limiting is reported as `PageResponse::RateLimited`.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, request: &ListRecordsRequest) -> Result<PageResponse>;
}

/// Long-term destination for harvested records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Idempotent upsert keyed by record id. Returns the number of rows
    /// written; an empty batch writes nothing.
    async fn upsert(&self, records: &[Record]) -> Result<u64>;
}
