//! Oracle checks against a real DuckDB instance.

use tlpfuzz_gen::{AggregateCall, AggregateFunction, SelectQuery};
use tlpfuzz_oracle::{
    CheckOutcome, DuckDbExecutor, ExpectedErrors, Harness, NoRecOracle, StatementExecutor,
    TestOracle, TlpAggregateOracle, TlpDistinctOracle, TlpGroupByOracle, TlpHavingOracle,
    TlpWhereOracle,
};

fn database(statements: &[&str]) -> DuckDbExecutor {
    let mut db = DuckDbExecutor::new().expect("open DuckDB");
    for sql in statements {
        db.execute(sql).expect(sql);
    }
    db
}

fn t0_query() -> SelectQuery {
    SelectQuery::new(vec!["t0.c0".into()], vec!["t0".into()])
}

#[test]
fn where_partitions_recombine_to_baseline() {
    let mut db = database(&[
        "CREATE TABLE t0(c0 INT)",
        "INSERT INTO t0 VALUES (1), (6), (NULL)",
    ]);
    let expected = ExpectedErrors::with_defaults();

    // Each partition holds exactly one of the three rows.
    for (predicate, rows) in [
        ("t0.c0 > 5", 1),
        ("NOT (t0.c0 > 5)", 1),
        ("(t0.c0 > 5) IS NULL", 1),
    ] {
        let sql = t0_query().with_where(predicate).to_sql();
        assert_eq!(db.execute(&sql).expect("partition").len(), rows, "{sql}");
    }

    let mut harness = Harness::new(&mut db, &expected);
    let mut oracle = TlpWhereOracle::default();
    let outcome = oracle
        .check_with(&mut harness, &t0_query(), "t0.c0 > 5")
        .expect("no bug");
    assert_eq!(outcome, CheckOutcome::Passed);
    assert_eq!(oracle.counters().passed, 1);
}

#[test]
fn where_with_order_by_still_recombines() {
    let mut db = database(&[
        "CREATE TABLE t0(c0 INT, c1 VARCHAR)",
        "INSERT INTO t0 VALUES (3, 'a'), (3, 'a'), (NULL, 'b'), (-1, NULL)",
    ]);
    let expected = ExpectedErrors::with_defaults();
    let mut harness = Harness::new(&mut db, &expected);
    let base = SelectQuery::new(vec!["t0.c0".into(), "t0.c1".into()], vec!["t0".into()])
        .with_order_by(vec!["t0.c1 DESC".into()]);
    let outcome = TlpWhereOracle::default()
        .check_with(&mut harness, &base, "t0.c1 LIKE 'a%'")
        .expect("no bug");
    assert!(outcome.is_passed());
}

#[test]
fn group_by_and_distinct_compare_as_sets() {
    let mut db = database(&[
        "CREATE TABLE t0(c0 INT)",
        "INSERT INTO t0 VALUES (1), (1), (6), (NULL), (NULL)",
    ]);
    let expected = ExpectedErrors::with_defaults();
    let mut harness = Harness::new(&mut db, &expected);

    let outcome = TlpGroupByOracle::default()
        .check_with(&mut harness, &t0_query(), "t0.c0 > 5")
        .expect("no bug");
    assert!(outcome.is_passed());

    for distinct in [[true, true, true], [false, true, false], [false, false, false]] {
        let outcome = TlpDistinctOracle::default()
            .check_with(&mut harness, &t0_query(), "t0.c0 > 5", distinct)
            .expect("no bug");
        assert!(outcome.is_passed());
    }
}

#[test]
fn having_partitions_groups() {
    let mut db = database(&[
        "CREATE TABLE t0(c0 INT, c1 INT)",
        "INSERT INTO t0 VALUES (1, 10), (1, 20), (2, 5), (3, NULL)",
    ]);
    let expected = ExpectedErrors::with_defaults();
    let mut harness = Harness::new(&mut db, &expected);

    let base = SelectQuery::new(
        vec!["t0.c0".into(), "SUM(t0.c1)".into()],
        vec!["t0".into()],
    )
    .with_group_by(vec!["t0.c0".into()]);
    let outcome = TlpHavingOracle::default()
        .check_with(&mut harness, &base, "SUM(t0.c1) > 10")
        .expect("no bug");
    assert!(outcome.is_passed());

    let ungrouped = TlpHavingOracle::default()
        .check_with(&mut harness, &t0_query(), "COUNT(*) > 1")
        .expect("skipped");
    assert!(matches!(ungrouped, CheckOutcome::Skipped(_)));
}

#[test]
fn aggregates_recompose_over_partitions() {
    let mut db = database(&[
        "CREATE TABLE t0(c0 INT)",
        "INSERT INTO t0 VALUES (1), (2), (3), (4)",
    ]);
    assert_eq!(
        db.execute("SELECT SUM(c0), COUNT(c0), AVG(c0) FROM t0")
            .expect("totals")
            .rows[0]
            .iter()
            .map(|v| v.as_f64().expect("numeric"))
            .collect::<Vec<_>>(),
        vec![10.0, 4.0, 2.5]
    );

    let expected = ExpectedErrors::with_defaults();
    let mut harness = Harness::new(&mut db, &expected);
    let mut oracle = TlpAggregateOracle::default();
    for function in AggregateFunction::ALL {
        let call = AggregateCall::new(function, "t0.c0");
        let outcome = oracle
            .check_with(&mut harness, &t0_query(), &call, "t0.c0 > 2")
            .unwrap_or_else(|e| panic!("{function:?}: {e}"));
        assert!(outcome.is_passed(), "{function:?}: {outcome:?}");
    }
    assert_eq!(oracle.counters().passed, AggregateFunction::ALL.len() as u64);
}

#[test]
fn stddev_recomposes_near_integer_limits() {
    let mut db = database(&[
        "CREATE TABLE t0(c0 INT)",
        "INSERT INTO t0 VALUES (2147483647), (2147483646), (2147483645)",
        "CREATE TABLE t1(c0 INT)",
        "INSERT INTO t1 VALUES (-2147483648), (-2147483647)",
    ]);
    let expected = ExpectedErrors::with_defaults();
    let mut harness = Harness::new(&mut db, &expected);
    let mut oracle = TlpAggregateOracle::default();
    let call = AggregateCall::new(AggregateFunction::StddevPop, "t0.c0");
    for predicate in ["t0.c0 > 0", "t0.c0 > 2147483646", "t0.c0 = 2147483646"] {
        let outcome = oracle
            .check_with(&mut harness, &t0_query(), &call, predicate)
            .unwrap_or_else(|e| panic!("{predicate}: {e}"));
        assert!(outcome.is_passed(), "{predicate}: {outcome:?}");
    }

    let t1 = SelectQuery::new(vec!["t1.c0".into()], vec!["t1".into()]);
    let call = AggregateCall::new(AggregateFunction::StddevPop, "t1.c0");
    let outcome = oracle
        .check_with(&mut harness, &t1, &call, "t1.c0 < -2147483647")
        .expect("no bug");
    assert!(outcome.is_passed());
}

#[test]
fn aggregate_over_empty_table_agrees() {
    let mut db = database(&["CREATE TABLE t0(c0 DOUBLE)"]);
    let expected = ExpectedErrors::with_defaults();
    let mut harness = Harness::new(&mut db, &expected);
    let mut oracle = TlpAggregateOracle::default();
    for function in [
        AggregateFunction::Count,
        AggregateFunction::Sum,
        AggregateFunction::Avg,
        AggregateFunction::Max,
    ] {
        let call = AggregateCall::new(function, "t0.c0");
        let outcome = oracle
            .check_with(&mut harness, &t0_query(), &call, "t0.c0 < 0")
            .expect("no bug");
        assert!(outcome.is_passed());
    }
}

#[test]
fn norec_counts_agree_on_duckdb() {
    let mut db = database(&[
        "CREATE TABLE t0(c0 INT, c1 BOOLEAN)",
        "CREATE TABLE t1(c0 INT)",
        "INSERT INTO t0 VALUES (1, TRUE), (6, NULL), (NULL, FALSE), (9, TRUE)",
        "INSERT INTO t1 VALUES (1), (2)",
        "CREATE INDEX i0 ON t0(c0)",
    ]);
    let expected = ExpectedErrors::with_defaults();
    let mut harness = Harness::new(&mut db, &expected);
    let mut oracle = NoRecOracle::default();
    let base = SelectQuery::new(vec!["t0.c0".into()], vec!["t0".into(), "t1".into()]);
    for predicate in ["t0.c0 > 5", "t0.c1", "(t0.c0 = t1.c0) OR (t0.c1 IS NULL)"] {
        let outcome = oracle
            .check_with(&mut harness, &base, predicate)
            .expect("no bug");
        assert!(outcome.is_passed(), "{predicate}");
    }
}

#[test]
fn benign_errors_skip_the_check() {
    let mut db = database(&[
        "CREATE TABLE t0(c0 VARCHAR)",
        "INSERT INTO t0 VALUES ('a')",
    ]);
    let expected = ExpectedErrors::with_defaults();
    let mut harness = Harness::new(&mut db, &expected);
    let base = SelectQuery::new(vec!["t0.c0".into()], vec!["t0".into()]);
    let outcome = TlpWhereOracle::default()
        .check_with(&mut harness, &base, "CAST(t0.c0 AS INTEGER) > 1")
        .expect("benign");
    assert!(matches!(outcome, CheckOutcome::Skipped(_)));
}

#[test]
fn unlisted_errors_fail_the_check() {
    let mut db = database(&["CREATE TABLE t0(c0 INT)"]);
    let expected = ExpectedErrors::new();
    let mut harness = Harness::new(&mut db, &expected);
    let base = SelectQuery::new(vec!["t0.c9".into()], vec!["t0".into()]);
    let mut oracle = TlpWhereOracle::default();
    let err = oracle
        .check_with(&mut harness, &base, "TRUE")
        .expect_err("missing column");
    assert!(!err.is_mismatch());
    assert_eq!(oracle.counters().failures, 1);
}
