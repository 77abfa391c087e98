//! Core data models used throughout pdfchat.
//!
//! These types represent the extracted records, indexed documents,
//! retrieval results, and conversation state that flow through the
//! ingestion and chat pipeline.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the three extraction categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Text,
    Table,
    Image,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Text => "text",
            Channel::Table => "table",
            Channel::Image => "image",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Channel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Channel::Text),
            "table" => Ok(Channel::Table),
            "image" => Ok(Channel::Image),
            other => anyhow::bail!("unknown channel: '{}'", other),
        }
    }
}

/// Channel-specific data carried alongside a record's searchable content.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Payload {
    /// Structured rows of a detected table, keyed by header.
    Table {
        headers: Vec<String>,
        rows: Vec<BTreeMap<String, String>>,
    },
    /// A rendered page, PNG bytes encoded as standard base64.
    Image { png_base64: String },
}

/// One extracted unit of a PDF.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentRecord {
    pub channel: Channel,
    pub content: String,
    /// 1-based page number.
    pub page: u32,
    /// `table_<page0>_<idx>` or `image_<idx>`; text records have none.
    pub local_id: Option<String>,
    pub payload: Option<Payload>,
}

/// Everything the extractor pulled out of one PDF, partitioned by channel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionResult {
    pub texts: Vec<ContentRecord>,
    pub tables: Vec<ContentRecord>,
    pub images: Vec<ContentRecord>,
    pub page_count: usize,
}

impl ExtractionResult {
    /// Iterates records channel by channel: text, then table, then image.
    pub fn channels(&self) -> [(Channel, &[ContentRecord]); 3] {
        [
            (Channel::Text, self.texts.as_slice()),
            (Channel::Table, self.tables.as_slice()),
            (Channel::Image, self.images.as_slice()),
        ]
    }

    pub fn record_count(&self) -> usize {
        self.texts.len() + self.tables.len() + self.images.len()
    }
}

/// Metadata attached to every indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(rename = "type")]
    pub kind: Channel,
    pub page: u32,
    pub source: Channel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
}

/// A normalized record as stored in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    /// `{channel}_{position}`.
    pub id: String,
    /// Full, untruncated content; this is what gets embedded.
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Stamp describing the corpus currently committed to the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorpusInfo {
    pub generation: i64,
    /// Hex SHA-256 of the uploaded PDF bytes.
    pub fingerprint: String,
    pub document_count: usize,
    pub indexed_at: DateTime<Utc>,
    /// Similarity space used by the index; always `"cosine"`.
    pub space: String,
    /// Embedding model the stored vectors came from.
    pub embedding_model: String,
    /// Length of every stored vector.
    pub dims: usize,
}

/// A nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalResult {
    pub content: String,
    pub metadata: DocumentMetadata,
    /// Cosine distance, `1 - cosine_similarity`.
    pub distance: f64,
}

/// One user/assistant exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationTurn {
    pub user: String,
    pub assistant: String,
}

/// A source attribution in a chat response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub kind: Channel,
    pub page: u32,
    pub content: String,
    pub relevance: f64,
}

/// The single response shape of a chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub session_id: String,
}

/// Counts reported after a successful ingest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub pages: usize,
    pub tables: usize,
    pub images: usize,
    pub documents: usize,
    pub generation: i64,
}
