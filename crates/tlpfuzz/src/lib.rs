//! # tlpfuzz: coverage-guided ternary logic partitioning
//!
//! Finds logic bugs in SQL engines by checking that a query's result equals
//! the combined results of its three partitions on `p`, `NOT p` and
//! `p IS NULL`, while steering generation toward statements that execute
//! successfully and reach new code in an instrumented target.
//!
//! A [`Session`] ties the pieces together:
//!
//! - [`tlpfuzz_gen`] generates tables, rows and queries,
//! - [`tlpfuzz_oracle`] runs the metamorphic checks,
//! - [`tlpfuzz_feedback`] records which features each statement used and
//!   whether it succeeded, gates features that never do, and weights the
//!   rest by mutual information with coverage edges,
//! - [`tlpfuzz_coverage`] reads those edges from the target's shared memory.
//!
//! ```rust,no_run
//! use tlpfuzz::{MemorySink, Session};
//! use tlpfuzz_config::TlpfuzzConfig;
//! use tlpfuzz_oracle::DuckDbExecutor;
//!
//! let mut config = TlpfuzzConfig::default();
//! config.session.seed = Some(42);
//! config.session.steps = 200;
//!
//! let executor = DuckDbExecutor::new()?;
//! let mut session = Session::new(config, executor, Box::new(MemorySink::default()))?;
//! let stats = session.run()?;
//! println!("{} bugs in {} steps", stats.bugs, stats.steps);
//! session.finish()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod session;
mod sink;
mod stats;

pub use error::{Result, SessionError};
pub use session::{Session, SqlEngine};
pub use sink::{BugLog, BugSink, FoundBug, MemorySink};
pub use stats::{SessionReport, SessionStats};

pub use tlpfuzz_config as config;
pub use tlpfuzz_coverage as coverage;
pub use tlpfuzz_feedback as feedback;
pub use tlpfuzz_gen as generator;
pub use tlpfuzz_oracle as oracle;
pub use tlpfuzz_types as types;
