use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One harvested publication. Never mutated after construction; a newer
/// version of the same paper is a new `Record` with the same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    /// `YYYY-MM-DD`, empty when unknown
    pub published: String,
    /// `YYYY-MM-DD`, empty when unknown
    pub updated: String,
}

impl Record {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_abstract(mut self, abstract_text: impl Into<String>) -> Self {
        self.abstract_text = abstract_text.into();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = authors.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dates(mut self, published: impl Into<String>, updated: impl Into<String>) -> Self {
        self.published = published.into();
        self.updated = updated.into();
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub base_url: String,
    pub metadata_prefix: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    /// Retries per page for transient failures (network, 5xx, malformed page)
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Pause between two successful page fetches of the same chain
    pub page_delay_ms: u64,
    /// Used when a rate-limit response carries no `Retry-After`
    pub rate_limit_fallback_ms: u64,
    pub max_rate_limit_waits: u32,
    /// Run one pagination chain per category-group in parallel
    pub concurrent: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: "http://export.arxiv.org/oai2".to_string(),
            metadata_prefix: "arXiv".to_string(),
            user_agent: "arXiv-Harvester/0.1".to_string(),
            timeout_seconds: 60,
            max_retries: 5,
            retry_delay_ms: 2_000,
            page_delay_ms: 100,
            rate_limit_fallback_ms: 10_000,
            max_rate_limit_waits: 10,
            concurrent: false,
        }
    }
}

impl HarvestConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn rate_limit_fallback(&self) -> Duration {
        Duration::from_millis(self.rate_limit_fallback_ms)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Still rate limited after {attempts} waits")]
    RateLimited { attempts: u32 },

    #[error("Malformed feed page: {0}")]
    MalformedPage(String),

    #[error("OAI-PMH error {code}: {message}")]
    Protocol { code: String, message: String },

    #[error("Unknown category group: {0}")]
    UnknownCategoryGroup(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Harvest cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl HarvestError {
    /// Whether the harvester may re-issue the request that produced this error.
    pub fn is_transient(&self) -> bool {
        match self {
            HarvestError::Http(_) | HarvestError::MalformedPage(_) => true,
            HarvestError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;

/// Parse a `YYYY-MM-DD` day.
pub fn parse_day(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| HarvestError::InvalidDate(value.to_string()))
}
