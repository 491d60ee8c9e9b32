//! # tlpfuzz-oracle: metamorphic SQL oracles
//!
//! Oracles that detect logic bugs without a reference engine, by running
//! semantically equivalent rewrites of a query on the same database and
//! comparing the results.
//!
//! ## Architecture
//!
//! - [`StatementExecutor`]: runs SQL against the engine under test.
//!   [`DuckDbExecutor`] is the in-process implementation.
//! - [`ExpectedErrors`]: errors that abandon a check instead of failing it.
//! - [`compare_results`]: order-insensitive comparison over canonical values.
//! - Ternary logic partitioning: [`TlpWhereOracle`], [`TlpHavingOracle`],
//!   [`TlpGroupByOracle`], [`TlpDistinctOracle`], [`TlpAggregateOracle`].
//! - [`NoRecOracle`]: filtered row count against a summed predicate.
//!
//! Every oracle has a deterministic `check_with` core taking a base query
//! and a predicate; [`TestOracle::check`] generates both and delegates.
//!
//! ```rust,no_run
//! use tlpfuzz_oracle::{DuckDbExecutor, ExpectedErrors, Harness, StatementExecutor, TlpWhereOracle};
//! use tlpfuzz_gen::SelectQuery;
//!
//! let mut db = DuckDbExecutor::new()?;
//! db.execute("CREATE TABLE t0(c0 INT)")?;
//! db.execute("INSERT INTO t0 VALUES (1), (6), (NULL)")?;
//!
//! let expected = ExpectedErrors::with_defaults();
//! let mut harness = Harness::new(&mut db, &expected);
//! let base = SelectQuery::new(vec!["t0.c0".into()], vec!["t0".into()]);
//! let outcome = TlpWhereOracle::default().check_with(&mut harness, &base, "t0.c0 > 5")?;
//! assert!(outcome.is_passed());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use tlpfuzz_types::ResultSet;

mod compare;
mod duckdb;
mod error;
mod expected;
mod harness;
mod norec;
mod report;
mod tlp;

pub use self::compare::{CompareMode, ResultMismatch, compare_results, concat_results};
pub use self::duckdb::DuckDbExecutor;
pub use self::error::{ExecutionError, OracleError};
pub use self::expected::{DEFAULT_PATTERNS, ExpectedErrors};
pub use self::harness::{
    CheckOutcome, Harness, OracleContext, OracleCounters, OracleKind, TestOracle, UnknownOracle,
};
pub use self::norec::{NoRecOracle, optimized_query, unoptimized_query};
pub use self::report::{BugReport, Reproducer};
pub use self::tlp::{
    TernaryPredicate, TlpAggregateOracle, TlpDistinctOracle, TlpGroupByOracle, TlpHavingOracle,
    TlpWhereOracle,
};

// ============================================================================
// Statement Executor Trait
// ============================================================================

/// Runs SQL statements against a database engine.
pub trait StatementExecutor {
    /// Executes one statement. Statements without a result set return an
    /// empty [`ResultSet`].
    fn execute(&mut self, sql: &str) -> Result<ResultSet, ExecutionError>;

    /// Drops every table and view.
    fn reset(&mut self) -> Result<(), ExecutionError>;

    /// Name of the engine, for logging.
    fn name(&self) -> &'static str;
}
