use tlpfuzz_gen::SelectQuery;
use tlpfuzz_types::GeneratorNode;

use super::{TernaryPredicate, partition_check};
use crate::compare::CompareMode;
use crate::error::OracleError;
use crate::harness::{
    CheckOutcome, Harness, OracleContext, OracleCounters, Step, TestOracle, finish, tally,
};

/// Groups by the fetched columns and partitions by WHERE. A group can appear
/// in more than one partition, so results are compared as sets.
#[derive(Debug, Default)]
pub struct TlpGroupByOracle {
    counters: OracleCounters,
}

impl TlpGroupByOracle {
    pub const NAME: &'static str = "TLP_GROUP_BY";

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
        let mut grouped = base.clone();
        grouped.group_by.clone_from(&base.fetch);
        grouped.where_clause = None;
        grouped.having = None;
        grouped.order_by.clear();

        let ternary = TernaryPredicate::new(predicate);
        let partitions = ternary
            .partitions()
            .map(|p| grouped.clone().with_where(p).to_sql());
        partition_check(
            harness,
            Self::NAME,
            grouped.to_sql(),
            partitions,
            CompareMode::Set,
        )
    }
}

impl TestOracle for TlpGroupByOracle {
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
        ctx.generator.note(GeneratorNode::GroupBy);
        let predicate = ctx.generator.predicate(&scope);
        self.check_with(&mut ctx.harness, &base, &predicate)
    }

    fn counters(&self) -> OracleCounters {
        self.counters
    }
}
