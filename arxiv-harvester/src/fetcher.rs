use crate::oai::ListRecordsRequest;
use crate::traits::{PageResponse, PageSource};
use crate::types::{HarvestConfig, HarvestError, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// HTTP transport for the OAI-PMH endpoint.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    base_url: String,
    metadata_prefix: String,
}

impl Fetcher {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            metadata_prefix: config.metadata_prefix.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl PageSource for Fetcher {
    async fn fetch_page(&self, request: &ListRecordsRequest) -> Result<PageResponse> {
        let url = request.to_url(&self.base_url, &self.metadata_prefix)?;
        let start_time = Instant::now();
        info!("Get from {}", url);

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();

        if is_rate_limit(status) {
            let retry_after = parse_retry_after(response.headers());
            warn!(
                "Rate limited by {} (HTTP {}), retry-after: {:?}",
                self.base_url, status, retry_after
            );
            return Ok(PageResponse::RateLimited { retry_after });
        }

        if !status.is_success() {
            return Err(HarvestError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!(
            "Fetched page ({} bytes) in {}ms",
            body.len(),
            start_time.elapsed().as_millis()
        );
        Ok(PageResponse::Body(body))
    }
}

fn is_rate_limit(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored and the
/// caller falls back to its default delay.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
