use tlpfuzz_gen::SelectQuery;
use tlpfuzz_types::GeneratorNode;

use super::{TernaryPredicate, partition_check};
use crate::compare::CompareMode;
use crate::error::OracleError;
use crate::harness::{
    CheckOutcome, Harness, OracleContext, OracleCounters, Step, TestOracle, finish, tally,
};

/// Partitions a grouped query by HAVING.
#[derive(Debug, Default)]
pub struct TlpHavingOracle {
    counters: OracleCounters,
}

impl TlpHavingOracle {
    pub const NAME: &'static str = "TLP_HAVING";

    /// `base` must group; `predicate` must be HAVING-eligible.
    pub fn check_with(
        &mut self,
        harness: &mut Harness<'_>,
        base: &SelectQuery,
        predicate: &str,
    ) -> Result<CheckOutcome, OracleError> {
        let result = if base.group_by.is_empty() {
            Ok(CheckOutcome::Skipped("HAVING without GROUP BY".into()))
        } else {
            finish(Self::run(harness, base, predicate))
        };
        tally(&mut self.counters, result)
    }

    fn run(harness: &mut Harness<'_>, base: &SelectQuery, predicate: &str) -> Step<()> {
        let mut baseline = base.clone();
        baseline.having = None;

        let ternary = TernaryPredicate::new(predicate);
        let partitions = ternary
            .partitions()
            .map(|p| base.clone().with_having(p).to_sql());
        partition_check(
            harness,
            Self::NAME,
            baseline.to_sql(),
            partitions,
            CompareMode::Multiset,
        )
    }
}

impl TestOracle for TlpHavingOracle {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn check(&mut self, ctx: &mut OracleContext<'_, '_>) -> Result<CheckOutcome, OracleError> {
        let generator = &mut *ctx.generator;
        let Some((mut base, scope)) = generator.base_query() else {
            return tally(
                &mut self.counters,
                Ok(CheckOutcome::Skipped("no tables".into())),
            );
        };

        let group_by = generator.fetch_columns(&scope);
        generator.note(GeneratorNode::GroupBy);
        generator.note(GeneratorNode::Having);
        let mut fetch = group_by.clone();
        fetch.push(generator.numeric_aggregate(&scope).to_sql());
        base.fetch = fetch;
        base.group_by.clone_from(&group_by);
        if generator.coin(0.5) {
            base = base.with_where(generator.predicate(&scope));
        }
        if generator.allows(GeneratorNode::OrderBy) && generator.coin(0.3) {
            generator.note(GeneratorNode::OrderBy);
            base = base.with_order_by(group_by);
        }
        let predicate = generator.having_predicate(&scope);
        self.check_with(&mut ctx.harness, &base, &predicate)
    }

    fn counters(&self) -> OracleCounters {
        self.counters
    }
}
