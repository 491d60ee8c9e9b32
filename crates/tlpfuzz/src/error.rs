//! Session error types.

use std::path::PathBuf;

use tlpfuzz_config::ConfigError;
use tlpfuzz_coverage::CoverageError;
use tlpfuzz_feedback::FeedbackError;
use tlpfuzz_oracle::{ExecutionError, UnknownOracle};

/// Errors that end a session.
///
/// Oracle failures and failed statements are not among them: those are
/// counted and the campaign moves on.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    UnknownOracle(#[from] UnknownOracle),

    #[error("invalid expected-error pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Coverage channel or target failure.
    #[error("coverage: {0}")]
    Coverage(#[from] CoverageError),

    #[error("gate files: {0}")]
    Feedback(#[from] FeedbackError),

    /// The engine could not be reset or introspected.
    #[error("{operation} failed: {source}")]
    Engine {
        operation: &'static str,
        #[source]
        source: ExecutionError,
    },

    #[error("no table could be created after {attempts} attempts")]
    EmptySchema { attempts: u32 },

    #[error("a coverage channel is already attached to this session")]
    ChannelAttached,

    #[error("coverage is enabled but no target is configured")]
    NoTarget,

    #[error("invalid readiness address `{address}`: {source}")]
    ReadyAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// The target exited while the campaign was running.
    #[error("target process (pid {pid}) is gone")]
    TargetGone { pid: u32 },

    #[error("cannot write {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;
