//! Core data models used throughout filedex.
//!
//! [`FileRecord`] is the indexed unit persisted in the metadata store; the
//! remaining types are the request/response shapes that cross the HTTP
//! boundary.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One indexed file. `file_id` doubles as the object store key.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub file_id: String,
    pub original_name: String,
    pub size: i64,
    pub content: String,
    pub upload_date: DateTime<Utc>,
}

impl FileRecord {
    pub fn summary(&self) -> FileSummary {
        FileSummary {
            file_id: self.file_id.clone(),
            original_name: self.original_name.clone(),
            size: self.size,
            upload_date: format_upload_date(&self.upload_date),
        }
    }
}

/// Listing/search row: a record without its extracted content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub file_id: String,
    pub original_name: String,
    pub size: i64,
    pub upload_date: String,
}

/// Attributes the object store reports for a key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectStat {
    pub size: i64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadTicket {
    pub file_id: String,
    pub presigned_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadTicket {
    pub presigned_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyUploadRequest {
    pub file_id: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

/// Canonical text form of an upload date.
///
/// Fixed millisecond precision with a `Z` suffix keeps lexical and
/// chronological order identical, which the `ORDER BY upload_date` queries
/// rely on.
pub fn format_upload_date(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_upload_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
