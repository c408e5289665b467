use crate::oai::{self, ListRecordsRequest, Page};
use crate::record_set::RecordSet;
use crate::traits::{PageResponse, PageSource};
use crate::types::{HarvestConfig, HarvestError, Result};
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{Days, NaiveDate};
use futures::future::try_join_all;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Half-open window `(from, until]` of one category-group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HarvestWindow {
    pub group: String,
    pub from: NaiveDate,
    pub until: NaiveDate,
}

impl HarvestWindow {
    pub fn new(group: impl Into<String>, from: NaiveDate, until: NaiveDate) -> Self {
        Self {
            group: group.into(),
            from,
            until,
        }
    }

    /// The window `(date - 1 day, date]`.
    pub fn for_day(group: impl Into<String>, date: NaiveDate) -> Self {
        let from = date.checked_sub_days(Days::new(1)).unwrap_or(date);
        Self::new(group, from, date)
    }

    fn initial_request(&self) -> ListRecordsRequest {
        ListRecordsRequest::initial(self.from, self.until, self.group.clone())
    }
}

enum HarvestState {
    Start,
    Fetching(ListRecordsRequest),
    Done,
}

/// Drives the resumption-token pagination of one window to completion.
pub struct Harvester<S> {
    source: S,
    config: HarvestConfig,
}

impl<S: PageSource> Harvester<S> {
    pub fn new(source: S, config: HarvestConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Every record of `window`. Pages are requested strictly one after
    /// another; cancellation is honoured between pages and during waits.
    pub async fn harvest(
        &self,
        window: &HarvestWindow,
        cancel: &CancellationToken,
    ) -> Result<RecordSet> {
        let start_time = Instant::now();
        let mut records = RecordSet::new();
        let mut pages = 0usize;
        let mut state = HarvestState::Start;

        loop {
            state = match state {
                HarvestState::Start => HarvestState::Fetching(window.initial_request()),
                HarvestState::Fetching(request) => {
                    if cancel.is_cancelled() {
                        info!("Harvest of {} cancelled after {} pages", window.group, pages);
                        return Err(HarvestError::Cancelled);
                    }

                    let page = self.fetch_page(&request, cancel).await?;
                    pages += 1;
                    debug!(
                        "Page {} of {}: {} records (list size {:?})",
                        pages,
                        window.group,
                        page.records.len(),
                        page.complete_list_size
                    );
                    let next_token = page.resumption_token;
                    records.extend(page.records);

                    if next_token.is_empty() {
                        HarvestState::Done
                    } else {
                        self.wait(self.config.page_delay(), cancel).await?;
                        HarvestState::Fetching(ListRecordsRequest::resume(next_token))
                    }
                }
                HarvestState::Done => break,
            };
        }

        info!(
            "Harvested {} records for {} ({} .. {}] in {} pages, {}ms",
            records.len(),
            window.group,
            window.from,
            window.until,
            pages,
            start_time.elapsed().as_millis()
        );
        Ok(records)
    }

    /// Harvest several windows, in parallel when `concurrent` is configured.
    /// Results keep the order of `windows`.
    pub async fn harvest_all(
        &self,
        windows: &[HarvestWindow],
        cancel: &CancellationToken,
    ) -> Result<Vec<(HarvestWindow, RecordSet)>> {
        if self.config.concurrent {
            try_join_all(windows.iter().map(|window| async move {
                let set = self.harvest(window, cancel).await?;
                Ok::<_, HarvestError>((window.clone(), set))
            }))
            .await
        } else {
            let mut results = Vec::with_capacity(windows.len());
            for window in windows {
                let set = self.harvest(window, cancel).await?;
                results.push((window.clone(), set));
            }
            Ok(results)
        }
    }

    /// Fetch and parse one page, re-issuing the same request on rate limits
    /// and transient failures.
    async fn fetch_page(
        &self,
        request: &ListRecordsRequest,
        cancel: &CancellationToken,
    ) -> Result<Page> {
        let mut backoff = self.backoff();
        let mut failures = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            let outcome = match self.source.fetch_page(request).await {
                Ok(PageResponse::Body(body)) => oai::parse_page(&body),
                Ok(PageResponse::RateLimited { retry_after }) => {
                    if rate_limit_waits >= self.config.max_rate_limit_waits {
                        error!("Giving up on {} after {} rate-limit waits", request, rate_limit_waits);
                        return Err(HarvestError::RateLimited {
                            attempts: rate_limit_waits,
                        });
                    }
                    rate_limit_waits += 1;
                    let delay = retry_after.unwrap_or_else(|| self.config.rate_limit_fallback());
                    info!("Rate limited on {}, waiting {:?}", request, delay);
                    self.wait(delay, cancel).await?;
                    continue;
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && failures < self.config.max_retries => {
                    failures += 1;
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.config.retry_delay());
                    warn!(
                        "Attempt {} failed for {}: {}, retrying in {:?}",
                        failures, request, e, delay
                    );
                    self.wait(delay, cancel).await?;
                }
                Err(e) => {
                    error!("Failed to fetch {} after {} attempts: {}", request, failures + 1, e);
                    return Err(e);
                }
            }
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        let initial = self.config.retry_delay();
        ExponentialBackoff {
            current_interval: initial,
            initial_interval: initial,
            max_interval: initial * 32,
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> Result<()> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(HarvestError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}
