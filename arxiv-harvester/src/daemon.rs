use crate::harvester::{HarvestWindow, Harvester};
use crate::taxonomy::Taxonomy;
use crate::traits::{PageSource, RecordSink};
use crate::types::{HarvestError, Result};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Keep only known category-groups. An empty request means every group.
pub fn validate_groups(requested: &[String], taxonomy: &Taxonomy) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(taxonomy.groups().map(str::to_string).collect());
    }

    let mut groups = Vec::new();
    for group in requested {
        let group = group.trim();
        if taxonomy.is_valid_group(group) {
            if !groups.iter().any(|g| g == group) {
                groups.push(group.to_string());
            }
        } else {
            warn!("Ignoring invalid category group '{}'", group);
        }
    }

    if groups.is_empty() {
        error!("No valid category group in {:?}", requested);
        return Err(HarvestError::UnknownCategoryGroup(requested.join(",")));
    }
    Ok(groups)
}

/// Crawls the previous day's listings of a fixed set of groups once per UTC
/// day and pushes them to a `RecordSink`.
pub struct CrawlDaemon<S, K> {
    groups: Vec<String>,
    harvester: Arc<Harvester<S>>,
    sink: K,
    wake_interval: Duration,
}

impl<S: PageSource, K: RecordSink> CrawlDaemon<S, K> {
    pub fn new(
        groups: Vec<String>,
        harvester: Arc<Harvester<S>>,
        sink: K,
        wake_interval: Duration,
    ) -> Self {
        Self {
            groups,
            harvester,
            sink,
            wake_interval,
        }
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Harvest `(date - 1, date]` for every group and upsert the records.
    /// Returns the number of rows written.
    pub async fn crawl_once(&self, date: NaiveDate, cancel: &CancellationToken) -> Result<u64> {
        let windows: Vec<HarvestWindow> = self
            .groups
            .iter()
            .map(|group| HarvestWindow::for_day(group.as_str(), date))
            .collect();

        let results = self.harvester.harvest_all(&windows, cancel).await?;

        let mut written = 0;
        for (window, records) in results {
            let rows = self.sink.upsert(records.records()).await?;
            info!(
                "Stored {} of {} records for {} on {}",
                rows,
                records.len(),
                window.group,
                date
            );
            written += rows;
        }
        Ok(written)
    }

    /// Run until `cancel` fires. A day is only marked done after a
    /// successful crawl, so a failure is retried on the next wake.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut last_day: Option<NaiveDate> = None;
        info!(
            "Crawl daemon started for {:?}, waking every {:?}",
            self.groups, self.wake_interval
        );

        loop {
            let today = Utc::now().date_naive();
            if last_day != Some(today) {
                info!("Fetch {}", today);
                match self.crawl_once(today, &cancel).await {
                    Ok(written) => {
                        info!("Crawl for {} finished, {} rows written", today, written);
                        last_day = Some(today);
                    }
                    Err(HarvestError::Cancelled) => break,
                    Err(e) => error!("Crawl for {} failed: {}", today, e),
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.wake_interval) => {}
            }
        }

        info!("Crawl daemon stopped");
        Ok(())
    }
}
