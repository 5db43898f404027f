//! Row models for the catalog tables

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Outcome classification of a read session, stored on the disc row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStatus {
    /// Row created, read not finished
    Pending,
    /// Read in progress
    Reading,
    /// Tool exited cleanly and the full graph was committed
    Complete,
    /// Session failed before any catalog rows were written
    Failed,
    /// Tool died mid-output; the fragments seen so far were committed
    Partial,
}

impl ReadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadStatus::Pending => "pending",
            ReadStatus::Reading => "reading",
            ReadStatus::Complete => "complete",
            ReadStatus::Failed => "failed",
            ReadStatus::Partial => "partial",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ReadStatus::Pending),
            "reading" => Some(ReadStatus::Reading),
            "complete" => Some(ReadStatus::Complete),
            "failed" => Some(ReadStatus::Failed),
            "partial" => Some(ReadStatus::Partial),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One generation of one physical disc
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DiscRow {
    pub disc_uid: String,
    pub fingerprint: String,
    pub generation: i64,
    pub supersedes_uid: Option<String>,
    pub label: Option<String>,
    pub disc_type: Option<String>,
    pub device_path: Option<String>,
    pub read_status: String,
    pub layout_digest: String,
    pub last_verified: Option<String>,
    pub created_at: String,
}

/// One title on a disc generation
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TitleRow {
    pub disc_uid: String,
    pub title_index: i64,
    pub name: Option<String>,
    pub duration_secs: i64,
    pub chapter_count: i64,
    pub size_bytes: i64,
}

/// One stream within a title. `attributes` is a JSON object of the raw
/// attribute id/value pairs not promoted to columns.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StreamRow {
    pub disc_uid: String,
    pub title_index: i64,
    pub stream_index: i64,
    pub kind: String,
    pub codec: Option<String>,
    pub language: Option<String>,
    pub attributes: String,
}
