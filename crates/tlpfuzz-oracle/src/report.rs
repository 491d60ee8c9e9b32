//! Bug reports and their reproducers.

use serde::{Deserialize, Serialize};
use tlpfuzz_types::ResultSet;

use crate::compare::CompareMode;
use crate::harness::Harness;
use crate::{norec, tlp};

/// Everything needed to replay a detected mismatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reproducer {
    /// Baseline against the combination of three partition queries.
    Partition {
        baseline: String,
        partitions: [String; 3],
        mode: CompareMode,
    },
    /// Whole-table aggregate against its recomposition.
    Aggregate { original: String, metamorphic: String },
    /// Row count of a filtered query against the summed predicate.
    RowCount { optimized: String, unoptimized: String },
}

impl Reproducer {
    /// Query texts in execution order.
    pub fn queries(&self) -> Vec<&str> {
        match self {
            Reproducer::Partition {
                baseline,
                partitions,
                ..
            } => std::iter::once(baseline.as_str())
                .chain(partitions.iter().map(String::as_str))
                .collect(),
            Reproducer::Aggregate {
                original,
                metamorphic,
            } => vec![original, metamorphic],
            Reproducer::RowCount {
                optimized,
                unoptimized,
            } => vec![optimized, unoptimized],
        }
    }

    /// Re-runs the stored queries. Any error, benign or not, counts as the
    /// bug no longer triggering.
    pub fn bug_still_triggers(&self, harness: &mut Harness<'_>) -> bool {
        let outcome = match self {
            Reproducer::Partition {
                baseline,
                partitions,
                mode,
            } => tlp::evaluate_partitions(harness, baseline, partitions, *mode)
                .map(|mismatch| mismatch.is_some()),
            Reproducer::Aggregate {
                original,
                metamorphic,
            } => tlp::aggregate::evaluate(harness, original, metamorphic)
                .map(|mismatch| mismatch.is_some()),
            Reproducer::RowCount {
                optimized,
                unoptimized,
            } => norec::evaluate(harness, optimized, unoptimized).map(|m| m.is_some()),
        };
        outcome.unwrap_or(false)
    }
}

/// A detected logic bug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugReport {
    /// Oracle that found it.
    pub oracle: String,
    pub message: String,
    pub reproducer: Reproducer,
    /// Result of the reference query.
    pub expected: Option<ResultSet>,
    /// Result of the rewritten or combined queries.
    pub actual: Option<ResultSet>,
}

impl BugReport {
    pub fn queries(&self) -> Vec<&str> {
        self.reproducer.queries()
    }

    /// SQL script reproducing the bug, one statement per line.
    pub fn to_script(&self) -> String {
        let mut script = format!("-- {}: {}\n", self.oracle, self.message);
        for query in self.queries() {
            script.push_str(query);
            script.push_str(";\n");
        }
        script
    }
}
