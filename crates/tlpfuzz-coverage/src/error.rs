//! Coverage channel error types.

use std::path::PathBuf;
use std::time::Duration;

/// Errors from the coverage channel and the instrumented target.
///
/// All of these are resource errors: the session cannot continue without a
/// working channel.
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    /// A SysV shared-memory call failed.
    #[error("shared memory {op} failed: {source}")]
    SharedMemory {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid coverage map size: {0}")]
    InvalidMapSize(usize),

    #[error("edge {index} out of range for map of {len} bytes")]
    EdgeOutOfRange { index: usize, len: usize },

    #[error("failed to spawn target {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The target exited before it became ready.
    #[error("target exited during warm-up: {status}")]
    TargetExited { status: String },

    #[error("target not ready within {0:?}")]
    ReadinessTimeout(Duration),

    #[error("readiness wait cancelled")]
    Cancelled,

    /// A target is already attached to this channel.
    #[error("channel already has a running target (pid {pid})")]
    TargetAlreadySpawned { pid: u32 },

    #[error("channel is closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CoverageError>;
