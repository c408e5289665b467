//! Persisted daily snapshots.
//!
//! ```text
//! {root}/
//! └── <category-group>/
//!     ├── 2024-03-01.bin
//!     └── 2024-03-02.bin
//! ```
//!
//! Each artifact is written once, via a uniquely named temporary sibling
//! that is linked into place only if no artifact exists yet, and is never
//! overwritten afterwards.

use crate::record_set::DailySnapshot;
use crate::types::{HarvestError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const FORMAT_VERSION: u32 = 1;
const EXTENSION: &str = "bin";

/// Result of reading a cache entry. Absent and unreadable entries are both
/// a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(DailySnapshot),
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// An artifact for the key already existed and was left untouched
    AlreadyPresent,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    format_version: u32,
    snapshot: DailySnapshot,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// `{root}/{group}/{YYYY-MM-DD}.bin`; `:` in set names becomes `_`.
    pub fn path_for(&self, group: &str, date: NaiveDate) -> PathBuf {
        self.root_dir
            .join(group.replace(':', "_"))
            .join(format!("{}.{}", date.format("%Y-%m-%d"), EXTENSION))
    }

    pub async fn load(&self, group: &str, date: NaiveDate) -> Result<CacheLookup> {
        let path = self.path_for(group, date);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No cached snapshot at {:?}", path);
                return Ok(CacheLookup::Miss);
            }
            Err(e) => return Err(HarvestError::Io(e)),
        };

        match decode(&bytes) {
            Ok(snapshot) if snapshot.category_group == group && snapshot.date == date => {
                debug!("Loaded {} records from {:?}", snapshot.len(), path);
                Ok(CacheLookup::Hit(snapshot))
            }
            Ok(snapshot) => {
                warn!(
                    "Snapshot at {:?} is keyed ({}, {}), expected ({}, {}); treating as miss",
                    path, snapshot.category_group, snapshot.date, group, date
                );
                Ok(CacheLookup::Miss)
            }
            Err(e) => {
                warn!("Corrupt snapshot at {:?}: {}; treating as miss", path, e);
                Ok(CacheLookup::Miss)
            }
        }
    }

    pub async fn save(&self, snapshot: &DailySnapshot) -> Result<SaveOutcome> {
        let path = self.path_for(&snapshot.category_group, snapshot.date);
        if tokio::fs::try_exists(&path).await? {
            warn!(
                "Snapshot for ({}, {}) already exists at {:?}, not overwriting",
                snapshot.category_group, snapshot.date, path
            );
            return Ok(SaveOutcome::AlreadyPresent);
        }

        let bytes = encode(snapshot)?;
        if !self.write_new(&path, bytes).await? {
            warn!(
                "Snapshot for ({}, {}) was written concurrently at {:?}, keeping it",
                snapshot.category_group, snapshot.date, path
            );
            return Ok(SaveOutcome::AlreadyPresent);
        }
        info!(
            "Cached {} records for ({}, {}) at {:?}",
            snapshot.len(),
            snapshot.category_group,
            snapshot.date,
            path
        );
        Ok(SaveOutcome::Written)
    }

    /// Write `bytes` to a private temporary file next to `path`, then link
    /// it into place unless `path` already exists. Returns false when
    /// another writer got there first. A failed write leaves no temp file.
    async fn write_new(&self, path: &Path, bytes: Vec<u8>) -> Result<bool> {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root_dir.clone());
        tokio::fs::create_dir_all(&parent).await?;

        let path = path.to_path_buf();
        let written = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".snapshot-")
                .suffix(".tmp")
                .tempfile_in(&parent)?;
            tmp.write_all(&bytes)?;
            tmp.as_file().sync_all()?;
            match tmp.persist_noclobber(&path) {
                Ok(_) => Ok(true),
                Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(e.error),
            }
        })
        .await
        .map_err(std::io::Error::other)??;
        Ok(written)
    }
}

fn encode(snapshot: &DailySnapshot) -> Result<Vec<u8>> {
    let file = SnapshotFileRef {
        format_version: FORMAT_VERSION,
        snapshot,
    };
    Ok(bincode::serialize(&file)?)
}

fn decode(bytes: &[u8]) -> Result<DailySnapshot> {
    let file: SnapshotFile = bincode::deserialize(bytes)?;
    if file.format_version != FORMAT_VERSION {
        return Err(HarvestError::Config(format!(
            "unsupported snapshot format version {}",
            file.format_version
        )));
    }
    Ok(file.snapshot)
}

#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    format_version: u32,
    snapshot: &'a DailySnapshot,
}
