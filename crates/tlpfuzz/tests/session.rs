//! End-to-end campaigns against in-process DuckDB.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tlpfuzz::config::{ClearMode, TlpfuzzConfig};
use tlpfuzz::coverage::{ChannelOptions, CoverageChannel, SharedSegment};
use tlpfuzz::generator::{Schema, SchemaProvider};
use tlpfuzz::oracle::{DuckDbExecutor, ExecutionError, StatementExecutor};
use tlpfuzz::types::ResultSet;
use tlpfuzz::{FoundBug, MemorySink, Session, SessionError};

fn config(dir: &Path, oracles: &[&str], steps: u64) -> TlpfuzzConfig {
    let mut config = TlpfuzzConfig::default();
    config.session.seed = Some(1234);
    config.session.steps = steps;
    config.session.queries_per_database = 10;
    config.session.output_dir = dir.join("out");
    config.feedback.gate_file = Some(dir.join("out/gates.txt"));
    config.feedback.update_every = 5;
    config.oracle.oracles = oracles.iter().map(|s| (*s).to_string()).collect();
    config
}

/// Loses the last row of any query filtering on a negated predicate.
struct DropsNegatedRow(DuckDbExecutor);

impl StatementExecutor for DropsNegatedRow {
    fn execute(&mut self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let mut result = self.0.execute(sql)?;
        if sql.contains("WHERE NOT (") {
            result.rows.pop();
        }
        Ok(result)
    }

    fn reset(&mut self) -> Result<(), ExecutionError> {
        self.0.reset()
    }

    fn name(&self) -> &'static str {
        "drops-negated-row"
    }
}

impl SchemaProvider for DropsNegatedRow {
    type Error = ExecutionError;

    fn schema(&mut self) -> Result<Schema, ExecutionError> {
        self.0.schema()
    }
}

/// Keeps every statement it is asked to run.
struct Recording {
    inner: DuckDbExecutor,
    log: Arc<Mutex<Vec<String>>>,
}

impl StatementExecutor for Recording {
    fn execute(&mut self, sql: &str) -> Result<ResultSet, ExecutionError> {
        self.log.lock().expect("log").push(sql.to_string());
        self.inner.execute(sql)
    }

    fn reset(&mut self) -> Result<(), ExecutionError> {
        self.inner.reset()
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

impl SchemaProvider for Recording {
    type Error = ExecutionError;

    fn schema(&mut self) -> Result<Schema, ExecutionError> {
        self.inner.schema()
    }
}

/// Fails negated queries the way a crashing executor would.
struct FailsNegated(DuckDbExecutor);

impl StatementExecutor for FailsNegated {
    fn execute(&mut self, sql: &str) -> Result<ResultSet, ExecutionError> {
        if sql.contains("WHERE NOT (") {
            return Err(ExecutionError::Internal("connection lost".into()));
        }
        self.0.execute(sql)
    }

    fn reset(&mut self) -> Result<(), ExecutionError> {
        self.0.reset()
    }

    fn name(&self) -> &'static str {
        "fails-negated"
    }
}

impl SchemaProvider for FailsNegated {
    type Error = ExecutionError;

    fn schema(&mut self) -> Result<Schema, ExecutionError> {
        self.0.schema()
    }
}

/// Runs a short campaign and returns every statement it executed.
fn recorded_campaign(dir: &Path, set_parameters: bool) -> Vec<String> {
    let mut config = config(dir, &["where"], 20);
    config.generator.extra_statements = 20;
    config.generator.set_parameters = set_parameters;
    let log = Arc::new(Mutex::new(Vec::new()));
    let executor = Recording {
        inner: DuckDbExecutor::new().expect("open DuckDB"),
        log: Arc::clone(&log),
    };
    let mut session =
        Session::new(config, executor, Box::new(MemorySink::default())).expect("session");
    session.run().expect("run");
    session.finish().expect("finish");
    log.lock().expect("log").clone()
}

#[test]
fn clean_engine_runs_exact_oracles_without_bugs() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Floating-point aggregate recomposition is left out: summation order
    // may differ between the two sides.
    let exact = ["where", "having", "group_by", "distinct", "norec"];
    let executor = DuckDbExecutor::new().expect("open DuckDB");
    let mut session =
        Session::new(config(dir.path(), &exact, 36), executor, Box::new(MemorySink::default()))
            .expect("session");

    let stats = session.run().expect("run");
    assert_eq!(stats.steps, 36);
    assert_eq!(stats.seed, 1234);
    assert!(stats.databases >= 4, "{stats:?}");
    assert!(stats.statements > 0);
    assert_eq!(stats.oracles.len(), 5);
    let totals = stats.totals();
    assert!(totals.checks >= 36);
    assert_eq!(totals.bugs, 0, "{stats:?}");
    assert_eq!(stats.bugs, 0);
    assert!(stats.query_success_rate.is_some());
    assert!(stats.gate_updates > 0);

    let report = session.finish().expect("finish");
    assert!(report.coverage.is_none());
    let gates = fs::read_to_string(dir.path().join("out/gates.txt")).expect("gate file");
    assert!(gates.lines().all(|l| l.contains(" : ")), "{gates}");
    assert!(dir.path().join("out/session.json").exists());
}

#[test]
fn same_seed_same_campaign() {
    let run = |dir: &Path| {
        let executor = DuckDbExecutor::new().expect("open DuckDB");
        let mut session = Session::new(
            config(dir, &["where", "aggregate", "norec"], 12),
            executor,
            Box::new(MemorySink::default()),
        )
        .expect("session");
        let mut stats = session.run().expect("run");
        stats.elapsed_secs = 0.0;
        stats
    };
    let a = tempfile::tempdir().expect("tempdir");
    let b = tempfile::tempdir().expect("tempdir");
    assert_eq!(run(a.path()), run(b.path()));
}

#[test]
fn planted_bug_is_reported_once_per_feature_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = DropsNegatedRow(DuckDbExecutor::new().expect("open DuckDB"));
    let mut session =
        Session::with_bug_log(config(dir.path(), &["where"], 30), executor).expect("session");

    let stats = session.run().expect("run");
    assert!(stats.bugs >= 1, "{stats:?}");
    assert_eq!(stats.oracles["TLP_WHERE"].bugs, stats.bugs + stats.duplicate_bugs);
    session.finish().expect("finish");

    let first = fs::read_to_string(dir.path().join("out/bugs/bug-0000.json")).expect("report");
    let bug: FoundBug = serde_json::from_str(&first).expect("parse");
    assert_eq!(bug.seed, 1234);
    assert_eq!(bug.report.oracle, "TLP_WHERE");
    assert!(bug.reproducible);
    assert_eq!(bug.report.queries().len(), 4);
    assert!(dir.path().join("out/bugs/bug-0000.sql").exists());
}

#[test]
fn coverage_feeds_the_weight_engine() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), &["where"], 6);
    config.coverage.clear = ClearMode::Never;

    let channel = CoverageChannel::create(ChannelOptions {
        map_size: 1024,
        ..ChannelOptions::default()
    })
    .expect("create channel");
    // Stands in for the instrumented target.
    let mut writer = SharedSegment::attach(channel.shm_id(), 1024).expect("attach");
    writer.write_byte(7, 3).expect("write edge");

    let executor = DuckDbExecutor::new().expect("open DuckDB");
    let mut session =
        Session::new(config, executor, Box::new(MemorySink::default())).expect("session");
    session.attach_channel(channel).expect("attach channel");

    let second = CoverageChannel::create(ChannelOptions {
        map_size: 1024,
        ..ChannelOptions::default()
    })
    .expect("create channel");
    assert!(matches!(
        session.attach_channel(second),
        Err(SessionError::ChannelAttached)
    ));

    session.run().expect("run");
    let statistics = session.weights().statistics();
    assert!(statistics.trials() > 6);
    assert_eq!(statistics.edge_activations(7), statistics.trials());
    assert_eq!(statistics.cumulative_hits(7), 3 * statistics.trials());
    assert_eq!(statistics.touched_edges(), &[7]);

    let report = session.finish().expect("finish");
    let coverage = report.coverage.expect("coverage summary");
    assert_eq!(coverage.hit_edges, 1);
    let map = fs::read(dir.path().join("out/coverage.map")).expect("snapshot");
    assert_eq!(map.len(), 1024);
    assert_eq!(map[7], 3);
    writer.release().expect("detach");
}

#[test]
fn invalid_configuration_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path(), &["where"], 1);
    config.oracle.max_attempts = 0;
    let executor = DuckDbExecutor::new().expect("open DuckDB");
    let err = Session::new(config, executor, Box::new(MemorySink::default()))
        .err()
        .expect("rejected");
    assert!(matches!(err, SessionError::Config(_)), "{err}");
}

#[test]
fn setup_changes_parameters_and_creates_views() {
    let dir = tempfile::tempdir().expect("tempdir");
    let statements = recorded_campaign(dir.path(), true);
    assert!(
        statements
            .iter()
            .any(|s| s.starts_with("SET ") || s.starts_with("RESET ")),
        "no parameter statements"
    );
    assert!(statements.iter().any(|s| s.starts_with("CREATE VIEW v")));

    let statistics =
        fs::read_to_string(dir.path().join("out/statistics.txt")).expect("statistics file");
    assert!(statistics.lines().count() > 0);
    assert!(
        statistics.lines().all(|l| l.contains(" : average=")),
        "{statistics}"
    );
    assert!(statistics.contains("CREATE_TABLE : "), "{statistics}");
}

#[test]
fn parameters_stay_untouched_when_disabled() {
    let dir = tempfile::tempdir().expect("tempdir");
    let statements = recorded_campaign(dir.path(), false);
    assert!(
        !statements
            .iter()
            .any(|s| s.starts_with("SET ") || s.starts_with("RESET ")),
    );
}

#[test]
fn unexpected_check_errors_are_counted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let executor = FailsNegated(DuckDbExecutor::new().expect("open DuckDB"));
    let mut session = Session::new(
        config(dir.path(), &["where"], 10),
        executor,
        Box::new(MemorySink::default()),
    )
    .expect("session");

    let stats = session.run().expect("run");
    assert_eq!(stats.steps, 10);
    assert!(stats.oracle_errors > 0, "{stats:?}");
    assert_eq!(stats.bugs, 0);
    let report = session.finish().expect("finish");
    let json = fs::read_to_string(dir.path().join("out/session.json")).expect("report");
    assert!(json.contains("\"oracle_errors\""), "{json}");
    assert_eq!(report.stats.oracle_errors, stats.oracle_errors);
}
