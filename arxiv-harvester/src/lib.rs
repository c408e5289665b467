pub mod types;
pub mod record_set;
pub mod taxonomy;
pub mod phrase;
pub mod filter;
pub mod oai;
pub mod traits;
pub mod fetcher;
pub mod harvester;
pub mod storage;
pub mod daily_cache;
pub mod sink;
pub mod daemon;
pub mod config;

pub use types::*;
pub use record_set::{DailySnapshot, RecordSet};
pub use taxonomy::Taxonomy;
pub use phrase::PhraseMatcher;
pub use filter::{CaseSensitivity, Composition, FilterConfig, FilterExpression, FilterSettings};
pub use oai::{ListRecordsRequest, Page};
pub use traits::{PageResponse, PageSource, RecordSink};
pub use fetcher::Fetcher;
pub use harvester::{HarvestWindow, Harvester};
pub use storage::{CacheLookup, SaveOutcome, SnapshotStore};
pub use daily_cache::{CacheQuery, Clock, DailyCache, DailyLookup};
pub use sink::PgRecordSink;
pub use daemon::CrawlDaemon;
pub use config::AppConfig;
