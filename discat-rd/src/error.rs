//! Read-session error types

use thiserror::Error;

/// Errors terminating a read session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Another session already holds the requested device
    #[error("Device busy: {0}")]
    DeviceBusy(String),

    /// The external tool could not be launched
    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    /// The tool exited uncleanly before finishing its output
    #[error("Tool crashed: {0}")]
    ToolCrashed(String),

    /// A disc with this fingerprint is already cataloged with a different
    /// layout, and nothing authorizes superseding it
    #[error("Conflicting identity for fingerprint {fingerprint}")]
    ConflictingIdentity { fingerprint: String },

    /// Catalog commit failed; no partial rows were written
    #[error("Commit failure: {0}")]
    CommitFailure(#[from] discat_common::Error),

    /// Session cancelled before the commit point
    #[error("Session cancelled")]
    Cancelled,
}

impl From<sqlx::Error> for SessionError {
    fn from(e: sqlx::Error) -> Self {
        SessionError::CommitFailure(e.into())
    }
}

/// A tool output line that could not be interpreted.
///
/// Malformed records are skipped with a warning rather than failing the
/// session, so this error never crosses the session boundary.
#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
}
