//! Day-granular access to harvested records.
//!
//! A lookup for `(category-group, day)` goes memory → persisted store →
//! harvest. Concurrent lookups of the same key share one harvest; the
//! result is persisted once and never refreshed, since a closed day's
//! listing does not change.

use crate::filter::{CaseSensitivity, FilterConfig, FilterExpression};
use crate::harvester::{HarvestWindow, Harvester};
use crate::record_set::{DailySnapshot, RecordSet};
use crate::storage::{CacheLookup, SaveOutcome, SnapshotStore};
use crate::taxonomy::Taxonomy;
use crate::traits::PageSource;
use crate::types::Result;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use futures::future::try_join_all;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

type SnapshotCell = Arc<OnceCell<Arc<DailySnapshot>>>;

/// What a daily lookup should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheQuery {
    /// Category tags; their owning groups are fetched and the result is
    /// narrowed to records carrying at least one of the tags.
    Categories(Vec<String>),
    /// Whole category-groups.
    Groups(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailyLookup {
    Available(RecordSet),
    /// The day has not closed yet
    Unavailable,
}

impl DailyLookup {
    pub fn into_records(self) -> Option<RecordSet> {
        match self {
            DailyLookup::Available(set) => Some(set),
            DailyLookup::Unavailable => None,
        }
    }
}

/// In-process snapshot layer keyed by `(group, day)`. A cell is created on
/// first lookup and filled by whichever caller gets there first.
#[derive(Default)]
struct MemoryCache {
    cells: Mutex<HashMap<(String, NaiveDate), SnapshotCell>>,
}

impl MemoryCache {
    async fn cell(&self, group: &str, date: NaiveDate) -> SnapshotCell {
        let mut cells = self.cells.lock().await;
        cells
            .entry((group.to_string(), date))
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    async fn loaded(&self) -> usize {
        let cells = self.cells.lock().await;
        cells.values().filter(|cell| cell.initialized()).count()
    }
}

pub struct DailyCache<S> {
    harvester: Arc<Harvester<S>>,
    store: SnapshotStore,
    taxonomy: Arc<Taxonomy>,
    memory: MemoryCache,
    clock: Clock,
    case: CaseSensitivity,
    shutdown: CancellationToken,
}

impl<S: PageSource> DailyCache<S> {
    pub fn new(harvester: Arc<Harvester<S>>, store: SnapshotStore, taxonomy: Arc<Taxonomy>) -> Self {
        Self {
            harvester,
            store,
            taxonomy,
            memory: MemoryCache::default(),
            clock: Arc::new(Utc::now),
            case: CaseSensitivity::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Case handling when narrowing a `CacheQuery::Categories` lookup.
    pub fn with_case_sensitivity(mut self, case: CaseSensitivity) -> Self {
        self.case = case;
        self
    }

    /// Harvests started by this cache stop when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn harvester(&self) -> &Harvester<S> {
        &self.harvester
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Number of snapshots currently held in memory.
    pub async fn loaded_snapshots(&self) -> usize {
        self.memory.loaded().await
    }

    /// A day is complete once its following midnight (UTC) has passed.
    pub fn is_complete_day(&self, date: NaiveDate) -> bool {
        match date.checked_add_days(Days::new(1)) {
            Some(next) => next.and_time(NaiveTime::MIN).and_utc() <= (self.clock)(),
            None => false,
        }
    }

    /// Records published on `date` for the categories or groups in `query`.
    pub async fn get_by_date(&self, date: NaiveDate, query: &CacheQuery) -> Result<DailyLookup> {
        let (groups, narrow) = match query {
            CacheQuery::Categories(categories) => {
                let groups = self.taxonomy.resolve_groups(categories)?;
                let narrow = FilterExpression::new(self.case).categories(categories);
                (groups, Some(narrow))
            }
            CacheQuery::Groups(groups) => {
                for group in groups {
                    self.taxonomy.validate_group(group)?;
                }
                (groups.iter().cloned().collect(), None)
            }
        };

        if !self.is_complete_day(date) {
            info!("{} has not closed yet, no data available", date);
            return Ok(DailyLookup::Unavailable);
        }

        let mut records = self.collect(&groups, date).await?;
        if let Some(narrow) = narrow {
            records = narrow.apply(&records);
        }
        Ok(DailyLookup::Available(records))
    }

    /// Records of `date` selected by `filter`. The groups to fetch come from
    /// the filter's category list.
    pub async fn query(&self, date: NaiveDate, filter: &FilterConfig) -> Result<DailyLookup> {
        let groups = filter.target_groups(&self.taxonomy)?;
        if !self.is_complete_day(date) {
            info!("{} has not closed yet, no data available", date);
            return Ok(DailyLookup::Unavailable);
        }

        let records = self.collect(&groups, date).await?;
        let selected = filter.apply(&records);
        info!(
            "Filter kept {} of {} records for {}",
            selected.len(),
            records.len(),
            date
        );
        Ok(DailyLookup::Available(selected))
    }

    /// The snapshot of one group and day. Callers must only ask for
    /// complete days; `get_by_date` and `query` enforce that.
    pub async fn snapshot(&self, group: &str, date: NaiveDate) -> Result<Arc<DailySnapshot>> {
        let cell = self.memory.cell(group, date).await;
        if let Some(snapshot) = cell.get() {
            debug!("Memory hit for ({}, {})", group, date);
            return Ok(snapshot.clone());
        }
        let snapshot = cell
            .get_or_try_init(|| self.load_or_harvest(group, date))
            .await?;
        Ok(snapshot.clone())
    }

    /// Union of the groups' snapshots, in group order.
    async fn collect(&self, groups: &BTreeSet<String>, date: NaiveDate) -> Result<RecordSet> {
        let snapshots = if self.harvester.config().concurrent {
            try_join_all(groups.iter().map(|group| self.snapshot(group, date))).await?
        } else {
            let mut snapshots = Vec::with_capacity(groups.len());
            for group in groups {
                snapshots.push(self.snapshot(group, date).await?);
            }
            snapshots
        };

        Ok(snapshots
            .iter()
            .fold(RecordSet::new(), |acc, snapshot| acc.union(&snapshot.records)))
    }

    async fn load_or_harvest(&self, group: &str, date: NaiveDate) -> Result<Arc<DailySnapshot>> {
        match self.store.load(group, date).await {
            Ok(CacheLookup::Hit(snapshot)) => {
                info!("Cache hit for ({}, {}): {} records", group, date, snapshot.len());
                return Ok(Arc::new(snapshot));
            }
            Ok(CacheLookup::Miss) => info!("Cache miss for ({}, {})", group, date),
            Err(e) => warn!("Cache read for ({}, {}) failed: {}; harvesting", group, date, e),
        }

        let window = HarvestWindow::for_day(group, date);
        let records = self.harvester.harvest(&window, &self.shutdown).await?;
        let snapshot = DailySnapshot::new(date, group, records);

        match self.store.save(&snapshot).await {
            Ok(SaveOutcome::Written) => {}
            Ok(SaveOutcome::AlreadyPresent) => {
                // Another writer got there first; its artifact is authoritative.
                if let Ok(CacheLookup::Hit(existing)) = self.store.load(group, date).await {
                    return Ok(Arc::new(existing));
                }
            }
            Err(e) => warn!("Failed to persist ({}, {}): {}", group, date, e),
        }
        Ok(Arc::new(snapshot))
    }
}
