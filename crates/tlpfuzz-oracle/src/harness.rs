//! Shared plumbing for every oracle: error classification, outcomes,
//! counters and the context a randomized check runs in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tlpfuzz_gen::QueryGenerator;
use tlpfuzz_types::ResultSet;
use tracing::debug;

use crate::StatementExecutor;
use crate::error::{ExecutionError, OracleError};
use crate::expected::ExpectedErrors;

/// Outcome of a check that found no bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Passed,
    /// Abandoned because of a benign error, a timeout or an unusable schema.
    Skipped(String),
}

impl CheckOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, CheckOutcome::Passed)
    }
}

/// Early exit from a check in progress.
#[derive(Debug)]
pub(crate) enum Interrupt {
    Skip(String),
    Fail(OracleError),
}

impl From<OracleError> for Interrupt {
    fn from(err: OracleError) -> Self {
        Interrupt::Fail(err)
    }
}

pub(crate) type Step<T> = std::result::Result<T, Interrupt>;

pub(crate) fn finish(step: Step<()>) -> Result<CheckOutcome, OracleError> {
    match step {
        Ok(()) => Ok(CheckOutcome::Passed),
        Err(Interrupt::Skip(reason)) => Ok(CheckOutcome::Skipped(reason)),
        Err(Interrupt::Fail(err)) => Err(err),
    }
}

pub(crate) fn tally(
    counters: &mut OracleCounters,
    result: Result<CheckOutcome, OracleError>,
) -> Result<CheckOutcome, OracleError> {
    counters.observe(&result);
    result
}

/// An executor paired with the errors that abandon a check.
pub struct Harness<'a> {
    executor: &'a mut dyn StatementExecutor,
    expected: &'a ExpectedErrors,
}

impl<'a> Harness<'a> {
    pub fn new(executor: &'a mut dyn StatementExecutor, expected: &'a ExpectedErrors) -> Self {
        Self { executor, expected }
    }

    pub fn executor(&mut self) -> &mut dyn StatementExecutor {
        &mut *self.executor
    }

    pub fn expected(&self) -> &ExpectedErrors {
        self.expected
    }

    /// Runs `sql` without classifying failures.
    pub fn execute(&mut self, sql: &str) -> Result<ResultSet, ExecutionError> {
        self.executor.execute(sql)
    }

    /// Turns an execution error into a skip or a hard failure.
    pub(crate) fn interrupt(&self, sql: &str, err: ExecutionError) -> Interrupt {
        if self.expected.is_expected(&err) {
            debug!(executor = self.executor.name(), sql, error = %err, "expected error");
            Interrupt::Skip(err.to_string())
        } else {
            Interrupt::Fail(OracleError::Execution {
                query: sql.to_string(),
                source: err,
            })
        }
    }

    pub(crate) fn query(&mut self, sql: &str) -> Step<ResultSet> {
        match self.executor.execute(sql) {
            Ok(result) => Ok(result),
            Err(err) => Err(self.interrupt(sql, err)),
        }
    }
}

/// What a randomized check needs: somewhere to run SQL and something to
/// generate it with.
pub struct OracleContext<'a, 'g> {
    pub harness: Harness<'a>,
    pub generator: &'a mut QueryGenerator<'g>,
}

impl<'a, 'g> OracleContext<'a, 'g> {
    pub fn new(
        executor: &'a mut dyn StatementExecutor,
        expected: &'a ExpectedErrors,
        generator: &'a mut QueryGenerator<'g>,
    ) -> Self {
        Self {
            harness: Harness::new(executor, expected),
            generator,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleCounters {
    pub checks: u64,
    pub passed: u64,
    pub skips: u64,
    pub bugs: u64,
    pub failures: u64,
}

impl OracleCounters {
    pub fn observe(&mut self, result: &Result<CheckOutcome, OracleError>) {
        self.checks += 1;
        match result {
            Ok(CheckOutcome::Passed) => self.passed += 1,
            Ok(CheckOutcome::Skipped(_)) => self.skips += 1,
            Err(OracleError::Mismatch(_)) => self.bugs += 1,
            Err(OracleError::Execution { .. }) => self.failures += 1,
        }
    }

    pub fn merge(&mut self, other: &OracleCounters) {
        self.checks += other.checks;
        self.passed += other.passed;
        self.skips += other.skips;
        self.bugs += other.bugs;
        self.failures += other.failures;
    }
}

/// A differential check over randomly generated queries.
pub trait TestOracle {
    fn name(&self) -> &'static str;

    /// Generates one test case and checks it.
    fn check(&mut self, ctx: &mut OracleContext<'_, '_>) -> Result<CheckOutcome, OracleError>;

    fn counters(&self) -> OracleCounters;
}

/// The oracles a campaign can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    Where,
    Having,
    GroupBy,
    Distinct,
    Aggregate,
    NoRec,
}

impl OracleKind {
    pub const ALL: [OracleKind; 6] = [
        OracleKind::Where,
        OracleKind::Having,
        OracleKind::GroupBy,
        OracleKind::Distinct,
        OracleKind::Aggregate,
        OracleKind::NoRec,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            OracleKind::Where => "where",
            OracleKind::Having => "having",
            OracleKind::GroupBy => "group_by",
            OracleKind::Distinct => "distinct",
            OracleKind::Aggregate => "aggregate",
            OracleKind::NoRec => "no_rec",
        }
    }

    pub fn build(self) -> Box<dyn TestOracle> {
        use crate::norec::NoRecOracle;
        use crate::tlp::{
            TlpAggregateOracle, TlpDistinctOracle, TlpGroupByOracle, TlpHavingOracle,
            TlpWhereOracle,
        };
        match self {
            OracleKind::Where => Box::new(TlpWhereOracle::default()),
            OracleKind::Having => Box::new(TlpHavingOracle::default()),
            OracleKind::GroupBy => Box::new(TlpGroupByOracle::default()),
            OracleKind::Distinct => Box::new(TlpDistinctOracle::default()),
            OracleKind::Aggregate => Box::new(TlpAggregateOracle::default()),
            OracleKind::NoRec => Box::new(NoRecOracle::default()),
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown oracle `{0}`")]
pub struct UnknownOracle(pub String);

impl FromStr for OracleKind {
    type Err = UnknownOracle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "norec" => Ok(OracleKind::NoRec),
            other => Self::ALL
                .into_iter()
                .find(|k| k.as_str() == other)
                .ok_or_else(|| UnknownOracle(s.to_string())),
        }
    }
}
