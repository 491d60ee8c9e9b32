//! Ternary logic partitioning.
//!
//! For any predicate `p` and row, exactly one of `p`, `NOT p` and
//! `p IS NULL` is true. A query therefore returns the same rows as the
//! combination of its three partitioned variants; a difference is a bug.

pub(crate) mod aggregate;
mod distinct;
mod group_by;
mod having;
mod where_clause;

pub use aggregate::TlpAggregateOracle;
pub use distinct::TlpDistinctOracle;
pub use group_by::TlpGroupByOracle;
pub use having::TlpHavingOracle;
pub use where_clause::TlpWhereOracle;

use tlpfuzz_types::ResultSet;

use crate::compare::{CompareMode, compare_results, concat_results};
use crate::error::OracleError;
use crate::harness::{Harness, Interrupt, Step};
use crate::report::{BugReport, Reproducer};

/// `p`, `NOT p` and `p IS NULL` for one generated predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TernaryPredicate {
    pub predicate: String,
    pub negated: String,
    pub is_null: String,
}

impl TernaryPredicate {
    pub fn new(predicate: impl Into<String>) -> Self {
        let predicate = predicate.into();
        Self {
            negated: format!("NOT ({predicate})"),
            is_null: format!("({predicate}) IS NULL"),
            predicate,
        }
    }

    pub fn partitions(&self) -> [&str; 3] {
        [&self.predicate, &self.negated, &self.is_null]
    }
}

/// Two results that should have agreed.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Divergence {
    pub expected: ResultSet,
    pub actual: ResultSet,
    pub message: String,
}

impl Divergence {
    pub(crate) fn into_interrupt(self, oracle: &str, reproducer: Reproducer) -> Interrupt {
        Interrupt::Fail(OracleError::Mismatch(Box::new(BugReport {
            oracle: oracle.to_string(),
            message: self.message,
            reproducer,
            expected: Some(self.expected),
            actual: Some(self.actual),
        })))
    }
}

/// Runs the baseline and the three partitions and compares them.
pub(crate) fn evaluate_partitions(
    harness: &mut Harness<'_>,
    baseline: &str,
    partitions: &[String; 3],
    mode: CompareMode,
) -> Step<Option<Divergence>> {
    let expected = harness.query(baseline)?;
    let mut parts = Vec::with_capacity(partitions.len());
    for sql in partitions {
        parts.push(harness.query(sql)?);
    }
    let actual = concat_results(&parts);
    Ok(compare_results(&expected, &actual, mode, "baseline", "partitions")
        .err()
        .map(|mismatch| Divergence {
            expected,
            actual,
            message: mismatch.to_string(),
        }))
}

pub(crate) fn partition_check(
    harness: &mut Harness<'_>,
    oracle: &str,
    baseline: String,
    partitions: [String; 3],
    mode: CompareMode,
) -> Step<()> {
    match evaluate_partitions(harness, &baseline, &partitions, mode)? {
        None => Ok(()),
        Some(divergence) => Err(divergence.into_interrupt(
            oracle,
            Reproducer::Partition {
                baseline,
                partitions,
                mode,
            },
        )),
    }
}
