use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tlpfuzz_coverage::CoverageSummary;
use tlpfuzz_oracle::OracleCounters;

/// Campaign totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub seed: u64,
    /// Oracle steps completed; a step may span several attempts.
    pub steps: u64,
    pub databases: u64,
    /// Setup and data-changing statements executed.
    pub statements: u64,
    pub failed_statements: u64,
    /// Bugs handed to the sink.
    pub bugs: u64,
    /// Mismatches whose feature set matched an earlier bug.
    pub duplicate_bugs: u64,
    /// Steps that ran out of attempts on benign errors.
    pub exhausted_steps: u64,
    /// Checks ended by an error outside the allow-list.
    #[serde(default)]
    pub oracle_errors: u64,
    pub gate_updates: u64,
    pub disabled_features: usize,
    pub disabled_composites: usize,
    pub query_success_rate: Option<f64>,
    pub statement_success_rate: Option<f64>,
    /// Per oracle name.
    pub oracles: BTreeMap<String, OracleCounters>,
    pub elapsed_secs: f64,
}

impl SessionStats {
    pub fn totals(&self) -> OracleCounters {
        let mut total = OracleCounters::default();
        for counters in self.oracles.values() {
            total.merge(counters);
        }
        total
    }

    /// Oracle checks per second.
    pub fn rate(&self) -> f64 {
        if self.elapsed_secs > 0.0 {
            self.totals().checks as f64 / self.elapsed_secs
        } else {
            0.0
        }
    }
}

/// What `Session::finish` leaves behind.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub stats: SessionStats,
    pub coverage: Option<CoverageSummary>,
}
