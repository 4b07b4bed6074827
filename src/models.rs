//! Wire types exchanged with the log-analytics API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Housekeeping column carrying the record's ingest timestamp, in epoch
/// microseconds.
pub const TIMESTAMP_COLUMN: &str = "_timestamp";

/// Body of the query endpoint: SQL plus absolute wire-format bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(rename = "startTime")]
    pub start_time: String,
    #[serde(rename = "endTime")]
    pub end_time: String,
}

/// One row returned by the query endpoint. Rows are schemaless objects;
/// typed access is limited to the timestamp column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogRecord {
    pub fields: Map<String, Value>,
}

impl LogRecord {
    /// Ingest timestamp in epoch microseconds, if the row carries one.
    pub fn timestamp_micros(&self) -> Option<i64> {
        self.fields.get(TIMESTAMP_COLUMN).and_then(Value::as_i64)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,
    #[serde(default)]
    pub storage_type: Option<String>,
    #[serde(default)]
    pub doc_count: Option<u64>,
    #[serde(default)]
    pub storage_size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    pub stream: String,
    pub doc_count: u64,
    #[serde(default)]
    pub storage_size_bytes: u64,
    #[serde(default)]
    pub compressed_size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionInfo {
    #[serde(default)]
    pub retention_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub version: String,
    #[serde(default)]
    pub build_date: Option<String>,
    #[serde(default)]
    pub commit_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedFilter {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub stream: String,
    pub filters_json: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    pub name: String,
    pub stream: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub condition: Option<String>,
}
