use tlpfuzz_gen::SelectQuery;
use tlpfuzz_types::GeneratorNode;

use super::{TernaryPredicate, partition_check};
use crate::compare::CompareMode;
use crate::error::OracleError;
use crate::harness::{
    CheckOutcome, Harness, OracleContext, OracleCounters, Step, TestOracle, finish, tally,
};

/// `SELECT DISTINCT` against partitions that may or may not be DISTINCT
/// themselves; compared as sets.
#[derive(Debug, Default)]
pub struct TlpDistinctOracle {
    counters: OracleCounters,
}

impl TlpDistinctOracle {
    pub const NAME: &'static str = "TLP_DISTINCT";

    /// `distinct[i]` selects whether partition `i` is DISTINCT.
    pub fn check_with(
        &mut self,
        harness: &mut Harness<'_>,
        base: &SelectQuery,
        predicate: &str,
        distinct: [bool; 3],
    ) -> Result<CheckOutcome, OracleError> {
        let result = finish(Self::run(harness, base, predicate, distinct));
        tally(&mut self.counters, result)
    }

    fn run(
        harness: &mut Harness<'_>,
        base: &SelectQuery,
        predicate: &str,
        distinct: [bool; 3],
    ) -> Step<()> {
        let mut baseline = base.clone().with_distinct(true);
        baseline.where_clause = None;
        baseline.order_by.clear();

        let ternary = TernaryPredicate::new(predicate);
        let [first, second, third] = ternary.partitions();
        let partition = |p: &str, d: bool| {
            let mut query = base.clone().with_where(p).with_distinct(d);
            query.order_by.clear();
            query.to_sql()
        };
        let partitions = [
            partition(first, distinct[0]),
            partition(second, distinct[1]),
            partition(third, distinct[2]),
        ];
        partition_check(
            harness,
            Self::NAME,
            baseline.to_sql(),
            partitions,
            CompareMode::Set,
        )
    }
}

impl TestOracle for TlpDistinctOracle {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&mut self, ctx: &mut OracleContext<'_, '_>) -> Result<CheckOutcome, OracleError> {
        let Some((base, scope)) = ctx.generator.base_query() else {
            return tally(
                &mut self.counters,
                Ok(CheckOutcome::Skipped("no tables".into())),
            );
        };
        ctx.generator.note(GeneratorNode::Distinct);
        let predicate = ctx.generator.predicate(&scope);
        let distinct = [
            ctx.generator.coin(0.5),
            ctx.generator.coin(0.5),
            ctx.generator.coin(0.5),
        ];
        self.check_with(&mut ctx.harness, &base, &predicate, distinct)
    }

    fn counters(&self) -> OracleCounters {
        self.counters
    }
}
