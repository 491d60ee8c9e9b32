//! Feedback error types.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted gate line is not `<name> : <true|false>`.
    #[error("{path}:{line}: malformed gate entry: {text}")]
    MalformedEntry {
        path: PathBuf,
        line: usize,
        text: String,
    },
}

pub type Result<T> = std::result::Result<T, FeedbackError>;
