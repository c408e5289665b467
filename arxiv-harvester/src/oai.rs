//! OAI-PMH `ListRecords` requests and page parsing for the arXiv metadata
//! format.

use crate::types::{HarvestError, Record, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fmt;
use tracing::debug;
use url::Url;

const NO_RECORDS_MATCH: &str = "noRecordsMatch";

/// One `ListRecords` request. A resumption token replaces every other
/// parameter of the original request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListRecordsRequest {
    Initial {
        from: Option<NaiveDate>,
        until: Option<NaiveDate>,
        set: Option<String>,
    },
    Resume {
        token: String,
    },
}

impl ListRecordsRequest {
    pub fn initial(from: NaiveDate, until: NaiveDate, set: impl Into<String>) -> Self {
        ListRecordsRequest::Initial {
            from: Some(from),
            until: Some(until),
            set: Some(set.into()),
        }
    }

    pub fn resume(token: impl Into<String>) -> Self {
        ListRecordsRequest::Resume {
            token: token.into(),
        }
    }

    pub fn to_url(&self, base_url: &str, metadata_prefix: &str) -> Result<Url> {
        let mut url = Url::parse(base_url)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("verb", "ListRecords");
            match self {
                ListRecordsRequest::Resume { token } => {
                    query.append_pair("resumptionToken", token);
                }
                ListRecordsRequest::Initial { from, until, set } => {
                    if let Some(from) = from {
                        query.append_pair("from", &from.format("%Y-%m-%d").to_string());
                    }
                    if let Some(until) = until {
                        query.append_pair("until", &until.format("%Y-%m-%d").to_string());
                    }
                    if let Some(set) = set {
                        query.append_pair("set", set);
                    }
                    query.append_pair("metadataPrefix", metadata_prefix);
                }
            }
        }
        Ok(url)
    }
}

impl fmt::Display for ListRecordsRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListRecordsRequest::Resume { token } => write!(f, "resume({})", token),
            ListRecordsRequest::Initial { from, until, set } => write!(
                f,
                "set={} from={} until={}",
                set.as_deref().unwrap_or("*"),
                from.map(|d| d.to_string()).unwrap_or_default(),
                until.map(|d| d.to_string()).unwrap_or_default()
            ),
        }
    }
}

/// Records of one page plus the continuation token (empty on the last page).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub records: Vec<Record>,
    pub resumption_token: String,
    pub complete_list_size: Option<u64>,
}

impl Page {
    pub fn is_last(&self) -> bool {
        self.resumption_token.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "responseDate")]
    response_date: Option<String>,
    #[serde(rename = "ListRecords")]
    list_records: Option<ListRecords>,
    error: Option<OaiError>,
}

#[derive(Debug, Deserialize)]
struct OaiError {
    #[serde(rename = "@code", default)]
    code: String,
    #[serde(rename = "$text", default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ListRecords {
    #[serde(rename = "record", default)]
    records: Vec<OaiRecord>,
    #[serde(rename = "resumptionToken")]
    resumption_token: Option<ResumptionToken>,
}

#[derive(Debug, Deserialize)]
struct ResumptionToken {
    #[serde(rename = "$text", default)]
    value: String,
    #[serde(rename = "@completeListSize")]
    complete_list_size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OaiRecord {
    header: Option<Header>,
    metadata: Option<Metadata>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(rename = "@status")]
    status: Option<String>,
    #[serde(default)]
    identifier: String,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(rename = "arXiv")]
    arxiv: Option<ArxivMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ArxivMetadata {
    id: String,
    created: String,
    updated: String,
    authors: Option<Authors>,
    title: String,
    categories: String,
    #[serde(rename = "abstract")]
    abstract_text: String,
}

#[derive(Debug, Default, Deserialize)]
struct Authors {
    #[serde(rename = "author", default)]
    authors: Vec<Author>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Author {
    keyname: String,
    forenames: String,
    suffix: String,
}

impl Author {
    fn display_name(&self) -> String {
        [self.forenames.trim(), self.keyname.trim(), self.suffix.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl From<ArxivMetadata> for Record {
    fn from(meta: ArxivMetadata) -> Self {
        Record {
            id: meta.id.trim().to_string(),
            title: collapse_whitespace(&meta.title),
            abstract_text: meta.abstract_text.trim().to_string(),
            categories: meta.categories.split_whitespace().map(str::to_string).collect(),
            authors: meta
                .authors
                .map(|a| {
                    a.authors
                        .iter()
                        .map(Author::display_name)
                        .filter(|name| !name.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            published: meta.created.trim().to_string(),
            updated: meta.updated.trim().to_string(),
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse one `ListRecords` response body.
///
/// Missing fields fall back to defaults; an unparsable document or one that
/// is not an OAI-PMH envelope is a `MalformedPage`.
pub fn parse_page(body: &str) -> Result<Page> {
    if body.trim().is_empty() {
        return Err(HarvestError::MalformedPage("empty response body".to_string()));
    }

    let envelope: Envelope = quick_xml::de::from_str(body)
        .map_err(|e| HarvestError::MalformedPage(format!("unparsable envelope: {}", e)))?;

    if envelope.response_date.is_none() {
        return Err(HarvestError::MalformedPage(
            "document is not an OAI-PMH response".to_string(),
        ));
    }

    if let Some(error) = envelope.error {
        if error.code == NO_RECORDS_MATCH {
            debug!("No records match the request");
            return Ok(Page::default());
        }
        return Err(HarvestError::Protocol {
            code: error.code,
            message: error.message.trim().to_string(),
        });
    }

    let Some(list) = envelope.list_records else {
        return Ok(Page::default());
    };

    let mut records = Vec::with_capacity(list.records.len());
    for record in list.records {
        let deleted = record
            .header
            .as_ref()
            .and_then(|h| h.status.as_deref())
            .is_some_and(|s| s == "deleted");
        match record.metadata.and_then(|m| m.arxiv) {
            Some(meta) if !deleted => records.push(Record::from(meta)),
            _ => {
                let identifier = record.header.map(|h| h.identifier).unwrap_or_default();
                debug!("Skipping record without metadata: {}", identifier);
            }
        }
    }

    let (resumption_token, complete_list_size) = match list.resumption_token {
        Some(token) => (token.value.trim().to_string(), token.complete_list_size),
        None => (String::new(), None),
    };

    Ok(Page {
        records,
        resumption_token,
        complete_list_size,
    })
}
