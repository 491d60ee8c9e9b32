//! Non-optimizing reference engine construction (NoREC).
//!
//! `SELECT … WHERE p` is usually optimized through indexes and predicate
//! pushdown. Moving `p` into the projection and summing it forces a full
//! evaluation per row; both must count the same rows.

use tlpfuzz_gen::SelectQuery;
use tlpfuzz_types::{ResultSet, Value};

use crate::error::OracleError;
use crate::harness::{
    CheckOutcome, Harness, OracleContext, OracleCounters, Step, TestOracle, finish, tally,
};
use crate::report::Reproducer;
use crate::tlp::Divergence;

#[derive(Debug, Default)]
pub struct NoRecOracle {
    counters: OracleCounters,
}

impl NoRecOracle {
    pub const NAME: &'static str = "NOREC";

    /// Compares the filtered row count of `base` against the summed
    /// predicate over the same FROM/JOIN context.
    pub fn check_with(
        &mut self,
        harness: &mut Harness<'_>,
        base: &SelectQuery,
        predicate: &str,
    ) -> Result<CheckOutcome, OracleError> {
        let optimized = optimized_query(base, predicate);
        let unoptimized = unoptimized_query(base, predicate);
        let step = match evaluate(harness, &optimized, &unoptimized) {
            Ok(None) => Ok(()),
            Ok(Some(divergence)) => Err(divergence.into_interrupt(
                Self::NAME,
                Reproducer::RowCount {
                    optimized,
                    unoptimized,
                },
            )),
            Err(interrupt) => Err(interrupt),
        };
        tally(&mut self.counters, finish(step))
    }
}

impl TestOracle for NoRecOracle {
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
        let predicate = ctx.generator.predicate(&scope);
        self.check_with(&mut ctx.harness, &base, &predicate)
    }

    fn counters(&self) -> OracleCounters {
        self.counters
    }
}

pub fn optimized_query(base: &SelectQuery, predicate: &str) -> String {
    let mut query = base.clone().with_where(predicate);
    query.group_by.clear();
    query.having = None;
    query.distinct = false;
    query.to_sql()
}

pub fn unoptimized_query(base: &SelectQuery, predicate: &str) -> String {
    format!(
        "SELECT SUM(count) FROM (SELECT CAST(({predicate}) IS NOT NULL AND ({predicate}) AS INTEGER) AS count FROM {}) AS res",
        base.from_clause()
    )
}

fn summed_count(result: &ResultSet) -> Option<i64> {
    match result.scalar() {
        None | Some(Value::Null) => Some(0),
        Some(value) => value.as_i64(),
    }
}

pub(crate) fn evaluate(
    harness: &mut Harness<'_>,
    optimized: &str,
    unoptimized: &str,
) -> Step<Option<Divergence>> {
    let expected = harness.query(optimized)?;
    let actual = harness.query(unoptimized)?;
    let first = expected.len() as i64;
    let second = summed_count(&actual);
    if second == Some(first) {
        return Ok(None);
    }
    let shown = second.map_or_else(|| format!("{:?}", actual.scalar()), |n| n.to_string());
    Ok(Some(Divergence {
        message: format!("row count mismatch: optimized={first}, unoptimized={shown}"),
        expected,
        actual,
    }))
}
