//! # tlpfuzz-coverage: edge coverage from an instrumented DBMS
//!
//! The target is built with AFL-style instrumentation: at startup it reads
//! the SysV segment id from `__AFL_SHM_ID` and bumps one byte per edge it
//! executes. [`CoverageChannel`] owns that segment, launches the target with
//! the id injected into its environment, and exposes snapshots of the map.
//!
//! Unix only.

mod channel;
mod error;
mod map;
mod sys;
mod target;

pub use channel::{ChannelOptions, CoverageChannel, DEFAULT_MAP_SIZE, MAP_SIZE_ENV_VAR, SHM_ENV_VAR};
pub use error::{CoverageError, Result};
pub use map::{CoverageMap, CoverageStatus, CoverageSummary, EdgeHits};
pub use sys::SharedSegment;
pub use target::{
    AliveProbe, CancelToken, ReadinessProbe, TargetCommand, TargetProcess, TcpProbe, WarmupPolicy,
};
