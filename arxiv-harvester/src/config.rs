use crate::types::{HarvestConfig, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub harvest: HarvestConfig,
    pub cache: CacheConfig,
    pub daemon: DaemonConfig,
    pub database: DatabaseConfig,
    /// Alternate taxonomy file; the builtin one is used when unset
    pub taxonomy_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            harvest: HarvestConfig::default(),
            cache: CacheConfig::default(),
            daemon: DaemonConfig::default(),
            database: DatabaseConfig::default(),
            taxonomy_path: None,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub root: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("arxiv"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Empty means every group of the taxonomy
    pub groups: Vec<String>,
    pub wake_interval_seconds: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            groups: Vec::new(),
            wake_interval_seconds: 30 * 60,
        }
    }
}

impl DaemonConfig {
    pub fn wake_interval(&self) -> Duration {
        Duration::from_secs(self.wake_interval_seconds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Like `load`, but a missing or unreadable file yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config from {:?}: {}. Using defaults.", path, e);
                let mut config = Self::default();
                config.apply_env();
                config
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// `DATABASE_URL` overrides the configured database.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database.url = Some(url);
            }
        }
    }
}
