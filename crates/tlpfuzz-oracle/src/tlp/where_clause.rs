use tlpfuzz_gen::SelectQuery;
use tlpfuzz_types::GeneratorNode;

use super::{TernaryPredicate, partition_check};
use crate::compare::CompareMode;
use crate::error::OracleError;
use crate::harness::{
    CheckOutcome, Harness, OracleContext, OracleCounters, Step, TestOracle, finish, tally,
};

/// Partitions by WHERE; the combined rows must equal the unfiltered query.
#[derive(Debug, Default)]
pub struct TlpWhereOracle {
    counters: OracleCounters,
}

impl TlpWhereOracle {
    pub const NAME: &'static str = "TLP_WHERE";

    /// Checks `base` partitioned by `predicate`. An ORDER BY on `base` is
    /// kept on the partitions only.
    pub fn check_with(
        &mut self,
        harness: &mut Harness<'_>,
        base: &SelectQuery,
        predicate: &str,
    ) -> Result<CheckOutcome, OracleError> {
        let result = finish(Self::run(harness, base, predicate));
        tally(&mut self.counters, result)
    }

    fn run(harness: &mut Harness<'_>, base: &SelectQuery, predicate: &str) -> Step<()> {
        let mut baseline = base.clone();
        baseline.where_clause = None;
        baseline.order_by.clear();

        let ternary = TernaryPredicate::new(predicate);
        let partitions = ternary
            .partitions()
            .map(|p| base.clone().with_where(p).to_sql());
        partition_check(
            harness,
            Self::NAME,
            baseline.to_sql(),
            partitions,
            CompareMode::Multiset,
        )
    }
}

impl TestOracle for TlpWhereOracle {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&mut self, ctx: &mut OracleContext<'_, '_>) -> Result<CheckOutcome, OracleError> {
        let Some((mut base, scope)) = ctx.generator.base_query() else {
            return tally(
                &mut self.counters,
                Ok(CheckOutcome::Skipped("no tables".into())),
            );
        };
        let predicate = ctx.generator.predicate(&scope);
        if ctx.generator.allows(GeneratorNode::OrderBy) && ctx.generator.coin(0.1) {
            base = base.with_order_by(ctx.generator.order_by(&scope));
        }
        self.check_with(&mut ctx.harness, &base, &predicate)
    }

    fn counters(&self) -> OracleCounters {
        self.counters
    }
}
