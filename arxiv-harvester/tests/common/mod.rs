#![allow(dead_code)]

use arxiv_harvester::{
    HarvestConfig, HarvestError, ListRecordsRequest, PageResponse, PageSource, Record,
    RecordSink, Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Millisecond delays so retry and pagination paths run quickly.
pub fn fast_config() -> HarvestConfig {
    HarvestConfig {
        max_retries: 3,
        retry_delay_ms: 1,
        page_delay_ms: 1,
        rate_limit_fallback_ms: 1,
        max_rate_limit_waits: 3,
        ..Default::default()
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub struct PaperXml<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub categories: &'a str,
    pub authors: &'a [(&'a str, &'a str)],
    pub abstract_text: &'a str,
}

impl<'a> PaperXml<'a> {
    pub fn new(id: &'a str, title: &'a str, categories: &'a str) -> Self {
        Self {
            id,
            title,
            categories,
            authors: &[],
            abstract_text: "",
        }
    }

    pub fn to_xml(&self) -> String {
        let authors: String = self
            .authors
            .iter()
            .map(|(forenames, keyname)| {
                format!(
                    "<author><keyname>{}</keyname><forenames>{}</forenames></author>",
                    keyname, forenames
                )
            })
            .collect();
        format!(
            r#"<record>
  <header><identifier>oai:arXiv.org:{id}</identifier><datestamp>2024-03-01</datestamp><setSpec>cs</setSpec></header>
  <metadata>
    <arXiv xmlns="http://arxiv.org/OAI/arXiv/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
      <id>{id}</id><created>2024-02-29</created>
      <authors>{authors}</authors>
      <title>{title}</title>
      <categories>{categories}</categories>
      <abstract>{abstract_text}</abstract>
    </arXiv>
  </metadata>
</record>"#,
            id = self.id,
            authors = authors,
            title = self.title,
            categories = self.categories,
            abstract_text = self.abstract_text,
        )
    }
}

/// A `ListRecords` page. `token` of `None` marks the last page.
pub fn page_xml(records: &[String], token: Option<&str>) -> String {
    let token = match token {
        Some(t) => format!(
            r#"<resumptionToken cursor="0" completeListSize="1000">{}</resumptionToken>"#,
            t
        ),
        None => r#"<resumptionToken cursor="0" completeListSize="1000"/>"#.to_string(),
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<responseDate>2024-03-02T10:00:00Z</responseDate>
<request verb="ListRecords">http://export.arxiv.org/oai2</request>
<ListRecords>
{}
{}
</ListRecords>
</OAI-PMH>"#,
        records.join("\n"),
        token
    )
}

pub fn error_xml(code: &str, message: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<responseDate>2024-03-02T10:00:00Z</responseDate>
<request verb="ListRecords">http://export.arxiv.org/oai2</request>
<error code="{}">{}</error>
</OAI-PMH>"#,
        code, message
    )
}

/// Page holding one record per id, all tagged `categories`.
pub fn simple_page(ids: &[&str], categories: &str, token: Option<&str>) -> String {
    let records: Vec<String> = ids
        .iter()
        .map(|id| PaperXml::new(id, &format!("Paper {}", id), categories).to_xml())
        .collect();
    page_xml(&records, token)
}

pub enum Step {
    Body(String),
    RateLimited(Option<Duration>),
    Status(u16),
}

/// Replays a fixed sequence of responses and records every request.
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<ListRecordsRequest>>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ListRecordsRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(&self, request: &ListRecordsRequest) -> Result<PageResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Body(body)) => Ok(PageResponse::Body(body)),
            Some(Step::RateLimited(retry_after)) => Ok(PageResponse::RateLimited { retry_after }),
            Some(Step::Status(status)) => Err(HarvestError::Status {
                status,
                url: request.to_string(),
            }),
            None => Err(HarvestError::Status {
                status: 404,
                url: "script exhausted".to_string(),
            }),
        }
    }
}

/// Answers every initial request for a set with a single, final page.
pub struct SetSource {
    pages: HashMap<String, String>,
    delay: Duration,
    requested_sets: Mutex<Vec<String>>,
}

impl SetSource {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            delay: Duration::ZERO,
            requested_sets: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(mut self, set: &str, body: String) -> Self {
        self.pages.insert(set.to_string(), body);
        self
    }

    /// Hold every response for `delay`, widening race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.requested_sets.lock().unwrap().len()
    }

    pub fn calls_for(&self, set: &str) -> usize {
        self.requested_sets
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.as_str() == set)
            .count()
    }
}

#[async_trait]
impl PageSource for SetSource {
    async fn fetch_page(&self, request: &ListRecordsRequest) -> Result<PageResponse> {
        let set = match request {
            ListRecordsRequest::Initial { set, .. } => set.clone().unwrap_or_default(),
            ListRecordsRequest::Resume { token } => {
                return Err(HarvestError::Protocol {
                    code: "badResumptionToken".to_string(),
                    message: token.clone(),
                })
            }
        };
        self.requested_sets.lock().unwrap().push(set.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let body = self
            .pages
            .get(&set)
            .cloned()
            .unwrap_or_else(|| error_xml("noRecordsMatch", "no records"));
        Ok(PageResponse::Body(body))
    }
}

/// In-memory upsert keyed by record id.
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<HashMap<String, Record>>,
    batches: Mutex<usize>,
}

impl MemorySink {
    pub fn rows(&self) -> HashMap<String, Record> {
        self.rows.lock().unwrap().clone()
    }

    pub fn batches(&self) -> usize {
        *self.batches.lock().unwrap()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn upsert(&self, records: &[Record]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        *self.batches.lock().unwrap() += 1;
        let mut rows = self.rows.lock().unwrap();
        for record in records {
            rows.insert(record.id.clone(), record.clone());
        }
        Ok(records.len() as u64)
    }
}
