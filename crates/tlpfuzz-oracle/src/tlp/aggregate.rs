//! Aggregate recomposition.
//!
//! A whole-table aggregate is recomputed from per-partition partial
//! aggregates combined in an outer query: COUNT and SUM add up, MIN and MAX
//! take the extreme, AVG is ΣSUM/ΣCOUNT and STDDEV_POP is rebuilt from
//! per-partition count, mean and squared deviation (`M2`), pooled as
//! `M2 = Σ M2ᵢ + Σ nᵢ (meanᵢ - mean)²`. The pooled form stays exact for
//! large, tightly clustered values where `Σx²/n - (Σx/n)²` cancels to zero.

use tlpfuzz_gen::{AggregateCall, AggregateFunction, SelectQuery};
use tlpfuzz_types::{GeneratorNode, ResultSet, Value};

use super::{Divergence, TernaryPredicate};
use crate::error::OracleError;
use crate::harness::{
    CheckOutcome, Harness, Interrupt, OracleContext, OracleCounters, Step, TestOracle, finish,
    tally,
};
use crate::report::Reproducer;

/// Relative tolerance for floating-point recomposition.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

#[derive(Debug)]
pub struct TlpAggregateOracle {
    counters: OracleCounters,
    tolerance: f64,
}

impl Default for TlpAggregateOracle {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE)
    }
}

impl TlpAggregateOracle {
    pub const NAME: &'static str = "TLP_AGGREGATE";

    pub fn new(tolerance: f64) -> Self {
        Self {
            counters: OracleCounters::default(),
            tolerance,
        }
    }

    /// Checks `aggregate` over the FROM/JOIN context of `base`.
    pub fn check_with(
        &mut self,
        harness: &mut Harness<'_>,
        base: &SelectQuery,
        aggregate: &AggregateCall,
        predicate: &str,
    ) -> Result<CheckOutcome, OracleError> {
        let original = original_query(base, aggregate);
        let metamorphic = recomposition_query(base, aggregate, &TernaryPredicate::new(predicate));
        let step = match evaluate_with(harness, &original, &metamorphic, self.tolerance) {
            Ok(None) => Ok(()),
            Ok(Some(divergence)) => Err(divergence.into_interrupt(
                Self::NAME,
                Reproducer::Aggregate {
                    original,
                    metamorphic,
                },
            )),
            Err(interrupt) => Err(interrupt),
        };
        tally(&mut self.counters, finish(step))
    }
}

impl TestOracle for TlpAggregateOracle {
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
        let aggregate = ctx.generator.aggregate(&scope);
        let predicate = ctx.generator.predicate(&scope);
        self.check_with(&mut ctx.harness, &base, &aggregate, &predicate)
    }

    fn counters(&self) -> OracleCounters {
        self.counters
    }
}

pub(crate) fn original_query(base: &SelectQuery, aggregate: &AggregateCall) -> String {
    SelectQuery::new(vec![aggregate.to_sql()], base.from.clone())
        .with_joins(base.joins.clone())
        .to_sql()
}

/// Partial aggregates each partition contributes, aliased `agg0..`.
fn partial_columns(call: &AggregateCall) -> Vec<String> {
    let arg = &call.arg;
    match call.function {
        AggregateFunction::Count
        | AggregateFunction::Sum
        | AggregateFunction::Min
        | AggregateFunction::Max => vec![format!("{} AS agg0", call.to_sql())],
        AggregateFunction::Avg => vec![
            format!("SUM({arg}) AS agg0"),
            format!("CAST(COUNT({arg}) AS DOUBLE) AS agg1"),
        ],
        AggregateFunction::StddevPop => vec![
            format!("CAST(COUNT({arg}) AS DOUBLE) AS agg0"),
            format!("AVG(CAST(({arg}) AS DOUBLE)) AS agg1"),
            format!("COUNT({arg}) * VAR_POP(CAST(({arg}) AS DOUBLE)) AS agg2"),
        ],
    }
}

fn outer_aggregate(function: AggregateFunction) -> &'static str {
    match function {
        AggregateFunction::Count | AggregateFunction::Sum => "SUM(agg0)",
        AggregateFunction::Min => "MIN(agg0)",
        AggregateFunction::Max => "MAX(agg0)",
        AggregateFunction::Avg => "SUM(CAST(agg0 AS DOUBLE)) / SUM(agg1)",
        AggregateFunction::StddevPop => {
            "SQRT((SUM(agg2) + SUM(agg0 * (agg1 - pooled.mean) * (agg1 - pooled.mean))) \
             / NULLIF(SUM(agg0), 0))"
        }
    }
}

/// FROM clause of the outer query over the `partitions` union.
fn outer_from(function: AggregateFunction) -> &'static str {
    match function {
        AggregateFunction::StddevPop => {
            "partitions, (SELECT SUM(agg0 * agg1) / NULLIF(SUM(agg0), 0) AS mean \
             FROM partitions) AS pooled"
        }
        _ => "partitions",
    }
}

pub(crate) fn recomposition_query(
    base: &SelectQuery,
    aggregate: &AggregateCall,
    ternary: &TernaryPredicate,
) -> String {
    let columns = partial_columns(aggregate);
    let parts: Vec<String> = ternary
        .partitions()
        .iter()
        .map(|p| {
            SelectQuery::new(columns.clone(), base.from.clone())
                .with_joins(base.joins.clone())
                .with_where(*p)
                .to_sql()
        })
        .collect();
    format!(
        "WITH partitions AS ({}) SELECT {} FROM {}",
        parts.join(" UNION ALL "),
        outer_aggregate(aggregate.function),
        outer_from(aggregate.function)
    )
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(_) | Value::Real(_) | Value::Boolean(_) => value.as_f64(),
        _ => None,
    }
}

/// Compares the two scalars. `Err` carries a reason to abandon the check.
fn scalars_agree(left: &Value, right: &Value, tolerance: f64) -> Result<bool, String> {
    match (left.is_null(), right.is_null()) {
        (true, true) => return Ok(true),
        (true, false) | (false, true) => return Ok(false),
        (false, false) => {}
    }
    if let (Some(a), Some(b)) = (numeric(left), numeric(right)) {
        if !a.is_finite() || !b.is_finite() {
            return Err(format!("non-finite aggregate: {a} vs {b}"));
        }
        let scale = a.abs().max(b.abs()).max(1.0);
        return Ok((a - b).abs() <= tolerance * scale);
    }
    Ok(left.canonical() == right.canonical())
}

fn scalar(result: &ResultSet) -> Value {
    result.scalar().cloned().unwrap_or(Value::Null)
}

pub(crate) fn evaluate(
    harness: &mut Harness<'_>,
    original: &str,
    metamorphic: &str,
) -> Step<Option<Divergence>> {
    evaluate_with(harness, original, metamorphic, DEFAULT_TOLERANCE)
}

/// Runs both queries. One side failing with a benign error abandons the
/// check; one side failing with any other error while the other succeeds
/// is a divergence.
fn evaluate_with(
    harness: &mut Harness<'_>,
    original: &str,
    metamorphic: &str,
    tolerance: f64,
) -> Step<Option<Divergence>> {
    let first = harness.execute(original);
    let second = harness.execute(metamorphic);
    let (expected, actual) = match (first, second) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(e), Err(_)) => return Err(harness.interrupt(original, e)),
        (Err(e), Ok(b)) => {
            if harness.expected().is_expected(&e) {
                return Err(harness.interrupt(original, e));
            }
            return Ok(Some(Divergence {
                message: format!("original query failed ({e}) but recomposition returned {}", scalar(&b)),
                expected: ResultSet::empty(),
                actual: b,
            }));
        }
        (Ok(a), Err(e)) => {
            if harness.expected().is_expected(&e) {
                return Err(harness.interrupt(metamorphic, e));
            }
            return Ok(Some(Divergence {
                message: format!("recomposition failed ({e}) but original returned {}", scalar(&a)),
                expected: a,
                actual: ResultSet::empty(),
            }));
        }
    };

    let (left, right) = (scalar(&expected), scalar(&actual));
    match scalars_agree(&left, &right, tolerance) {
        Ok(true) => Ok(None),
        Ok(false) => Ok(Some(Divergence {
            message: format!("aggregate mismatch: original={left}, recomposed={right}"),
            expected,
            actual,
        })),
        Err(reason) => Err(Interrupt::Skip(reason)),
    }
}
