//! Error taxonomy shared by every component.
//!
//! Each variant belongs to exactly one [`ErrorKind`]. Callers decide how to
//! react (retry on the next run, surface as 404, fall back to another search
//! strategy) by matching on the kind, never on the rendered message.

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of failure kinds an operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Transport,
    ProcessingFailed,
    IndexUnavailable,
    ConfigurationFatal,
    Database,
}

#[derive(Debug, Error)]
pub enum Error {
    /// The key is absent from the object store at the time of the check.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Object store unreachable, rejected credentials, or any non-404 failure.
    #[error("object store transport error: {0}")]
    Transport(String),

    /// Extraction or storage failed for one specific file.
    #[error("processing failed for {file_id}: {reason}")]
    ProcessingFailed { file_id: String, reason: String },

    /// The full-text index could not answer a query.
    #[error("full-text index unavailable: {0}")]
    IndexUnavailable(String),

    /// A required collaborator is missing or misconfigured at startup.
    #[error("configuration error: {0}")]
    ConfigurationFatal(String),

    /// Metadata store I/O failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::Transport(_) => ErrorKind::Transport,
            Error::ProcessingFailed { .. } => ErrorKind::ProcessingFailed,
            Error::IndexUnavailable(_) => ErrorKind::IndexUnavailable,
            Error::ConfigurationFatal(_) => ErrorKind::ConfigurationFatal,
            Error::Database(_) => ErrorKind::Database,
        }
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn processing(file_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ProcessingFailed {
            file_id: file_id.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigurationFatal(msg.into())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_per_variant() {
        assert_eq!(Error::not_found("abc").kind(), ErrorKind::NotFound);
        assert_eq!(Error::transport("down").kind(), ErrorKind::Transport);
        assert_eq!(
            Error::processing("abc", "bad pdf").kind(),
            ErrorKind::ProcessingFailed
        );
        assert_eq!(
            Error::IndexUnavailable("corrupt".into()).kind(),
            ErrorKind::IndexUnavailable
        );
        assert_eq!(Error::config("no creds").kind(), ErrorKind::ConfigurationFatal);
    }

    #[test]
    fn not_found_message_names_key() {
        assert_eq!(Error::not_found("abc").to_string(), "object not found: abc");
    }
}
