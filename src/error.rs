//! Centralized error types for mlcache.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mlcache library.
#[derive(Error, Debug)]
pub enum MlError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A header block or body could not be decoded.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An external fetch (git, curl) failed.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// A cache or tag file holds malformed JSON.
    #[error("Corrupt cache file '{path}': {reason}")]
    CorruptCache { path: PathBuf, reason: String },

    /// The tag store has no entry for the message.
    #[error("No tags recorded for message {0}")]
    UnknownMessage(String),

    /// A tag requested for removal is not attached to the message.
    #[error("Message {message_id} does not carry tag '{tag}'")]
    TagNotPresent { message_id: String, tag: String },

    /// The body has no `---` line to insert a tag line before.
    #[error("Cannot find the '---' line to insert the tag before")]
    NoSplitMarker,

    /// A field needed by the operation is not available.
    #[error("Mail has no '{0}' field")]
    MissingField(String),

    /// The mail lacks a date or a subject.
    #[error("Mail is broken: {0}")]
    BrokenMail(String),

    /// No metadata directory could be found.
    #[error("Metadata directory not found: {0}")]
    RootNotFound(String),
}

/// Convenience alias for `Result<T, MlError>`.
pub type Result<T> = std::result::Result<T, MlError>;

impl MlError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `CorruptCache` variant from a path and any displayable reason.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        Self::CorruptCache {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `MlError::io`).
impl From<std::io::Error> for MlError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
