//! The campaign loop: build a database, run oracle checks against it, feed
//! every statement's features and coverage back into generation.

use std::fs;
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tlpfuzz_config::{ClearCadence, OracleConfig, TlpfuzzConfig};
use tlpfuzz_coverage::{
    AliveProbe, CancelToken, ChannelOptions, CoverageChannel, ReadinessProbe, TargetCommand,
    TcpProbe, WarmupPolicy,
};
use tlpfuzz_feedback::{
    ExecutionScoreboard, FeatureWeightEngine, FeedbackHandle, GatingPolicy, WeightConfig,
};
use tlpfuzz_gen::{
    DataType, DatabaseGenerator, FunctionCatalog, GeneratorOptions, ParameterCatalog,
    QueryGenerator, Schema, SchemaProvider, SetupOptions, TableSchema,
};
use tlpfuzz_oracle::{
    BugReport, CheckOutcome, ExecutionError, ExpectedErrors, Harness, OracleContext, OracleError,
    OracleKind, StatementExecutor, TestOracle, TlpAggregateOracle,
};
use tlpfuzz_types::{FeatureId, FeatureRegistry};
use tracing::{debug, info, warn};

use crate::error::{Result, SessionError};
use crate::sink::{BugLog, BugSink, FoundBug};
use crate::stats::{SessionReport, SessionStats};

/// Rounds of `CREATE TABLE` before giving up on a database.
const SETUP_ATTEMPTS: u32 = 3;

/// An engine the session can drive: executes SQL and reports its schema.
pub trait SqlEngine: StatementExecutor + SchemaProvider<Error = ExecutionError> {}

impl<T> SqlEngine for T where T: StatementExecutor + SchemaProvider<Error = ExecutionError> {}

enum Attempt {
    Done,
    Retry(String),
}

/// One campaign against one engine.
///
/// Owns the feedback state (scoreboard, weight engine, feature registry),
/// the optional coverage channel, the oracles and the bug sink. Independent
/// sessions share nothing.
pub struct Session<E> {
    config: TlpfuzzConfig,
    seed: u64,
    rng: SmallRng,
    registry: FeatureRegistry,
    catalog: FunctionCatalog,
    /// Engine settings `SET` during setup; empty when disabled.
    parameters: ParameterCatalog,
    scoreboard: ExecutionScoreboard,
    engine: FeatureWeightEngine,
    channel: Option<CoverageChannel>,
    cadence: ClearCadence,
    cancel: CancelToken,
    executor: E,
    expected: ExpectedErrors,
    oracles: Vec<Box<dyn TestOracle>>,
    sink: Box<dyn BugSink>,
    schema: Schema,
    checks_on_database: u64,
    /// Statements observed through the channel, for the clear cadence.
    observed: u64,
    /// Records committed since gates were last derived.
    unfolded: u64,
    stats: SessionStats,
}

impl<E: SqlEngine> Session<E> {
    pub fn new(config: TlpfuzzConfig, executor: E, sink: Box<dyn BugSink>) -> Result<Self> {
        config.validate()?;
        let seed = config.session.seed.unwrap_or_else(rand::random);

        let mut registry = FeatureRegistry::new();
        let catalog = FunctionCatalog::builtin();
        catalog.register(&mut registry);
        let parameters = if config.generator.set_parameters {
            ParameterCatalog::duckdb()
        } else {
            ParameterCatalog::default()
        };
        parameters.register(&mut registry);

        let feedback = &config.feedback;
        let mut scoreboard = ExecutionScoreboard::with_policies(
            GatingPolicy {
                min_observations: feedback.min_observations,
                quick_start: feedback.quick_start,
            },
            GatingPolicy {
                min_observations: feedback.composite_min_observations,
                quick_start: feedback.composite_quick_start,
            },
        );
        if let Some(path) = &feedback.deny_list {
            let denied = scoreboard.load_deny_list(path, &registry)?;
            info!(path = %path.display(), denied, "deny list loaded");
        }
        if let Some(path) = feedback.gate_file.as_ref().filter(|p| p.exists()) {
            let restored = scoreboard.load_persisted(path, &registry)?;
            info!(path = %path.display(), restored, "persisted gates restored");
        }

        let engine = FeatureWeightEngine::new(registry.len(), 0, weight_config(&config));
        let expected = expected_errors(&config.oracle)?;
        let oracles = build_oracles(&config.oracle)?;
        let cadence = config.coverage.clear_cadence();

        info!(
            seed,
            engine = executor.name(),
            oracles = oracles.len(),
            features = registry.len(),
            "session created"
        );

        Ok(Self {
            rng: SmallRng::seed_from_u64(seed),
            seed,
            registry,
            catalog,
            parameters,
            scoreboard,
            engine,
            channel: None,
            cadence,
            cancel: CancelToken::new(),
            executor,
            expected,
            oracles,
            sink,
            schema: Schema::default(),
            checks_on_database: 0,
            observed: 0,
            unfolded: 0,
            stats: SessionStats {
                seed,
                ..SessionStats::default()
            },
            config,
        })
    }

    /// A session writing bugs under `<output_dir>/bugs`.
    pub fn with_bug_log(config: TlpfuzzConfig, executor: E) -> Result<Self> {
        let log = BugLog::create(config.session.output_dir.join("bugs"))?;
        Self::new(config, executor, Box::new(log))
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &TlpfuzzConfig {
        &self.config
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    pub fn scoreboard(&self) -> &ExecutionScoreboard {
        &self.scoreboard
    }

    pub fn weights(&self) -> &FeatureWeightEngine {
        &self.engine
    }

    pub fn channel(&self) -> Option<&CoverageChannel> {
        self.channel.as_ref()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Cancelling stops the readiness wait and ends `run` after the
    /// current step.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // ------------------------------------------------------------------
    // Coverage
    // ------------------------------------------------------------------

    /// Attaches a channel created elsewhere. Weight statistics restart at
    /// the channel's map size.
    pub fn attach_channel(&mut self, channel: CoverageChannel) -> Result<()> {
        if self.channel.as_ref().is_some_and(|c| !c.is_closed()) {
            return Err(SessionError::ChannelAttached);
        }
        if self.engine.statistics().trials() > 0 {
            warn!(
                trials = self.engine.statistics().trials(),
                "coverage statistics restarted for new channel"
            );
        }
        self.engine = FeatureWeightEngine::new(
            self.registry.len(),
            channel.map_size(),
            weight_config(&self.config),
        );
        self.observed = 0;
        self.channel = Some(channel);
        Ok(())
    }

    /// Creates the channel, launches the configured target and waits for it
    /// to become ready. Returns the target's pid.
    pub fn start_coverage(&mut self) -> Result<u32> {
        if self.channel.as_ref().is_some_and(|c| !c.is_closed()) {
            return Err(SessionError::ChannelAttached);
        }
        let coverage = &self.config.coverage;
        let program = coverage.target.clone().ok_or(SessionError::NoTarget)?;

        let mut command = TargetCommand::new(program).args(coverage.args.iter().cloned());
        for (key, value) in &coverage.env {
            command = command.env(key.clone(), value.clone());
        }
        let mut probe: Box<dyn ReadinessProbe> = match &coverage.ready_address {
            Some(address) => {
                let addr = address.parse().map_err(|source| SessionError::ReadyAddress {
                    address: address.clone(),
                    source,
                })?;
                Box::new(TcpProbe::new(addr))
            }
            None => Box::new(AliveProbe::new(coverage.poll_interval() * 5)),
        };

        let options = ChannelOptions {
            map_size: coverage.map_size,
            warmup: WarmupPolicy {
                deadline: coverage.warmup_deadline(),
                poll_interval: coverage.poll_interval(),
            },
            shutdown_grace: coverage.shutdown_grace(),
            ..ChannelOptions::default()
        };
        let mut channel = CoverageChannel::create(options)?;
        let pid = channel.spawn(&command, probe.as_mut(), &self.cancel)?;
        info!(pid, shm_id = channel.shm_id(), "target attached");
        self.attach_channel(channel)?;
        Ok(pid)
    }

    fn before_statement(&mut self) -> Result<()> {
        if let Some(channel) = self.channel.as_mut() {
            if self.cadence.clears_before(self.observed) {
                channel.clear()?;
            }
        }
        Ok(())
    }

    /// Folds the last committed record and the current map into the
    /// weight engine.
    fn observe_coverage(&mut self) -> Result<()> {
        self.observed += 1;
        let Some(channel) = self.channel.as_mut() else {
            return Ok(());
        };
        if let Some(pid) = channel.target_pid() {
            if !channel.target_alive() {
                return Err(SessionError::TargetGone { pid });
            }
        }
        let active: Vec<FeatureId> = self
            .scoreboard
            .last_record()
            .map(|r| r.feature_ids().collect())
            .unwrap_or_default();
        let snapshot = channel.refresh()?;
        self.engine.update(&active, snapshot.as_slice());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    fn commit(&mut self, is_query: bool, success: bool) -> Result<()> {
        self.scoreboard.set_query(is_query);
        self.scoreboard.set_outcome(success);
        self.scoreboard.commit();
        self.observe_coverage()?;
        self.unfolded += 1;
        if self.unfolded >= self.config.feedback.update_every {
            self.update_gates();
        }
        Ok(())
    }

    fn update_gates(&mut self) {
        self.unfolded = 0;
        let changes = self.scoreboard.update(&self.registry);
        let types: Vec<&str> = DataType::ALL.iter().map(|t| t.as_str()).collect();
        let blocked = self
            .scoreboard
            .derive_function_gates(self.catalog.arities(), &types);
        self.stats.gate_updates += 1;
        if !changes.is_empty() {
            info!(
                enabled = changes.enabled.len(),
                disabled = changes.disabled.len(),
                blocked_functions = blocked,
                "feature gates updated"
            );
            debug!(disabled = ?changes.disabled, "newly disabled");
        }
    }

    // ------------------------------------------------------------------
    // Database setup
    // ------------------------------------------------------------------

    fn setup_options(&self) -> SetupOptions {
        let generator = &self.config.generator;
        SetupOptions {
            tables: generator.tables,
            max_columns: generator.max_columns,
            max_rows: generator.max_rows,
        }
    }

    fn generator_options(&self) -> GeneratorOptions {
        let generator = &self.config.generator;
        GeneratorOptions {
            max_depth: generator.max_depth,
            max_tables: generator.max_tables,
            natural_outer_join: generator.natural_outer_join,
            null_ratio: generator.null_ratio,
        }
    }

    /// Starts a record and generates one setup statement into it.
    fn generate_setup<T>(&mut self, build: impl FnOnce(&mut DatabaseGenerator<'_>) -> T) -> T {
        let options = self.setup_options();
        self.scoreboard.begin_record();
        let probabilities: &[f64] = if self.config.feedback.weighting {
            self.engine.probabilities()
        } else {
            &[]
        };
        let mut feedback = FeedbackHandle::new(&mut self.scoreboard, probabilities);
        let mut generator = DatabaseGenerator::new(
            options,
            self.config.generator.null_ratio,
            &mut self.rng,
            &mut feedback,
        );
        build(&mut generator)
    }

    /// Starts a record and generates one data-changing statement into it.
    fn generate_dml<T>(
        &mut self,
        schema: &Schema,
        build: impl FnOnce(&mut QueryGenerator<'_>) -> T,
    ) -> T {
        let options = self.generator_options();
        self.scoreboard.begin_record();
        let probabilities: &[f64] = if self.config.feedback.weighting {
            self.engine.probabilities()
        } else {
            &[]
        };
        let mut feedback = FeedbackHandle::new(&mut self.scoreboard, probabilities);
        let mut generator = QueryGenerator::new(
            schema,
            &self.catalog,
            &self.registry,
            options,
            &mut self.rng,
            &mut feedback,
        );
        build(&mut generator)
    }

    /// Starts a record and generates a `SET` or `RESET` for one engine
    /// parameter.
    fn generate_parameter(&mut self) -> Option<String> {
        let options = self.setup_options();
        self.scoreboard.begin_record();
        let probabilities: &[f64] = if self.config.feedback.weighting {
            self.engine.probabilities()
        } else {
            &[]
        };
        let mut feedback = FeedbackHandle::new(&mut self.scoreboard, probabilities);
        let mut generator = DatabaseGenerator::new(
            options,
            self.config.generator.null_ratio,
            &mut self.rng,
            &mut feedback,
        );
        generator.set_parameter(&self.parameters, &self.registry)
    }

    /// Executes the statement of the working record and commits it.
    fn run_statement(&mut self, sql: &str) -> Result<bool> {
        self.before_statement()?;
        let success = match self.executor.execute(sql) {
            Ok(_) => true,
            Err(err) => {
                self.stats.failed_statements += 1;
                debug!(sql, error = %err, "statement failed");
                false
            }
        };
        self.stats.statements += 1;
        self.commit(false, success)?;
        Ok(success)
    }

    /// Resets the engine and fills it with fresh tables and rows.
    pub fn build_database(&mut self) -> Result<()> {
        self.executor
            .reset()
            .map_err(|source| SessionError::Engine {
                operation: "reset",
                source,
            })?;
        self.stats.databases += 1;
        self.checks_on_database = 0;

        let mut tables: Vec<TableSchema> = Vec::new();
        for _ in 0..SETUP_ATTEMPTS {
            for index in 0..self.config.generator.tables {
                let (table, sql) = self.generate_setup(|g| g.create_table(index));
                if self.run_statement(&sql)? {
                    tables.push(table);
                }
            }
            if !tables.is_empty() {
                break;
            }
        }
        if tables.is_empty() {
            return Err(SessionError::EmptySchema {
                attempts: SETUP_ATTEMPTS,
            });
        }

        for table in &tables {
            let sql = self.generate_setup(|g| g.insert(table));
            self.run_statement(&sql)?;
        }
        let created = Schema {
            tables: tables.clone(),
        };
        for index in 0..self.config.generator.extra_statements {
            self.data_statement(&created, index)?;
        }

        self.schema = self
            .executor
            .schema()
            .map_err(|source| SessionError::Engine {
                operation: "schema introspection",
                source,
            })?;
        if self.schema.is_empty() {
            return Err(SessionError::EmptySchema {
                attempts: SETUP_ATTEMPTS,
            });
        }
        info!(
            database = self.stats.databases,
            tables = self.schema.tables.len(),
            "database ready"
        );
        Ok(())
    }

    fn data_statement(&mut self, schema: &Schema, index: usize) -> Result<()> {
        let table = &schema.tables[self.rng.gen_range(0..schema.tables.len())];
        let sql = match self.rng.gen_range(0..7) {
            0 => Some(self.generate_setup(|g| g.insert(table))),
            1 => Some(self.generate_setup(|g| g.create_index(table, index))),
            2 => self.generate_dml(schema, |g| g.update_statement(table)),
            3 => Some(self.generate_dml(schema, |g| g.delete_statement(table))),
            4 => self.generate_dml(schema, |g| g.create_view(index)),
            5 => self.generate_parameter(),
            _ => Some(self.generate_setup(|g| g.analyze())),
        };
        match sql {
            Some(sql) => {
                self.run_statement(&sql)?;
            }
            None => self.scoreboard.discard(),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Checks
    // ------------------------------------------------------------------

    fn attempt(&mut self, index: usize) -> Result<Attempt> {
        let options = self.generator_options();
        self.scoreboard.begin_record();
        self.before_statement()?;
        let result = {
            let probabilities: &[f64] = if self.config.feedback.weighting {
                self.engine.probabilities()
            } else {
                &[]
            };
            let mut feedback = FeedbackHandle::new(&mut self.scoreboard, probabilities);
            let mut generator = QueryGenerator::new(
                &self.schema,
                &self.catalog,
                &self.registry,
                options,
                &mut self.rng,
                &mut feedback,
            );
            let mut ctx = OracleContext::new(&mut self.executor, &self.expected, &mut generator);
            self.oracles[index].check(&mut ctx)
        };

        // A mismatch means every query executed.
        let success = matches!(
            result,
            Ok(CheckOutcome::Passed) | Err(OracleError::Mismatch(_))
        );
        self.commit(true, success)?;

        match result {
            Ok(CheckOutcome::Passed) => Ok(Attempt::Done),
            Ok(CheckOutcome::Skipped(reason)) => Ok(Attempt::Retry(reason)),
            Err(OracleError::Mismatch(report)) => {
                self.handle_bug(*report)?;
                Ok(Attempt::Done)
            }
            Err(err) => {
                self.stats.oracle_errors += 1;
                warn!(oracle = self.oracles[index].name(), error = %err, "check failed");
                Ok(Attempt::Done)
            }
        }
    }

    fn handle_bug(&mut self, report: BugReport) -> Result<()> {
        if self.scoreboard.is_duplicate_bug() {
            self.stats.duplicate_bugs += 1;
            debug!(oracle = %report.oracle, "mismatch matches a known bug");
            return Ok(());
        }
        self.scoreboard.remember_bug();

        let reproducible = {
            let mut harness = Harness::new(&mut self.executor, &self.expected);
            report.reproducer.bug_still_triggers(&mut harness)
        };
        if !reproducible {
            warn!(oracle = %report.oracle, "mismatch did not reproduce on re-run");
        }
        warn!(
            oracle = %report.oracle,
            step = self.stats.steps,
            message = %report.message,
            "logic bug found"
        );

        let bug = FoundBug {
            found_at: Utc::now(),
            seed: self.seed,
            step: self.stats.steps,
            reproducible,
            report,
        };
        self.sink.report(&bug)?;
        self.stats.bugs += 1;
        Ok(())
    }

    /// One oracle step, retried while checks are abandoned.
    pub fn step(&mut self) -> Result<()> {
        if self.schema.is_empty()
            || self.checks_on_database >= self.config.session.queries_per_database
        {
            self.build_database()?;
        }

        let index = (self.stats.steps % self.oracles.len() as u64) as usize;
        let attempts = self.config.oracle.max_attempts;
        for attempt in 1..=attempts {
            match self.attempt(index)? {
                Attempt::Done => break,
                Attempt::Retry(reason) => {
                    debug!(
                        oracle = self.oracles[index].name(),
                        attempt,
                        reason = %reason,
                        "check abandoned"
                    );
                    if attempt == attempts {
                        self.stats.exhausted_steps += 1;
                    }
                }
            }
        }
        self.stats.steps += 1;
        self.checks_on_database += 1;
        Ok(())
    }

    /// Runs steps until `session.steps` is reached or the session is
    /// cancelled.
    pub fn run(&mut self) -> Result<SessionStats> {
        let started = Instant::now();
        let target = self.config.session.steps;
        info!(seed = self.seed, steps = target, "campaign started");

        let result = self.run_steps(target);
        self.stats.elapsed_secs += started.elapsed().as_secs_f64();
        result?;

        let stats = self.stats();
        info!(
            steps = stats.steps,
            bugs = stats.bugs,
            duplicates = stats.duplicate_bugs,
            checks_per_sec = stats.rate(),
            "campaign finished"
        );
        Ok(stats)
    }

    fn run_steps(&mut self, target: u64) -> Result<()> {
        while self.stats.steps < target {
            if self.cancel.is_cancelled() {
                info!(steps = self.stats.steps, "campaign cancelled");
                break;
            }
            self.step()?;
        }
        Ok(())
    }

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.clone();
        stats.oracles.clear();
        for oracle in &self.oracles {
            stats
                .oracles
                .entry(oracle.name().to_string())
                .or_default()
                .merge(&oracle.counters());
        }
        stats.disabled_features = self.scoreboard.feature_table().disabled_count();
        stats.disabled_composites = self.scoreboard.composite_table().disabled_count();
        stats.query_success_rate = self.scoreboard.query_stats().rate();
        stats.statement_success_rate = self.scoreboard.statement_stats().rate();
        stats
    }

    /// Derives final gates, persists them, writes `session.json`, the
    /// feature statistics and the coverage map, and closes the channel.
    pub fn finish(mut self) -> Result<SessionReport> {
        if self.unfolded > 0 {
            self.update_gates();
        }
        if let Some(path) = &self.config.feedback.gate_file {
            ensure_parent(path)?;
            self.scoreboard.persist(path, &self.registry)?;
            info!(path = %path.display(), "gates persisted");
        }

        let output_dir = self.config.session.output_dir.clone();
        fs::create_dir_all(&output_dir).map_err(|source| SessionError::Output {
            path: output_dir.clone(),
            source,
        })?;
        self.scoreboard
            .save_statistics(&output_dir.join("statistics.txt"), &self.registry)?;

        let coverage = match self.channel.take() {
            Some(channel) => {
                let summary = channel.summary();
                channel.save_snapshot(&output_dir.join("coverage.map"))?;
                channel.close()?;
                Some(summary)
            }
            None => None,
        };

        let report = SessionReport {
            stats: self.stats(),
            coverage,
        };
        let json = serde_json::to_string_pretty(&report).map_err(|source| {
            SessionError::Encode {
                what: "session report",
                source,
            }
        })?;
        let path = output_dir.join("session.json");
        fs::write(&path, json).map_err(|source| SessionError::Output { path, source })?;
        Ok(report)
    }
}

fn weight_config(config: &TlpfuzzConfig) -> WeightConfig {
    WeightConfig {
        exponent: config.feedback.exponent,
        recompute_every: config.feedback.recompute_every,
    }
}

fn expected_errors(config: &OracleConfig) -> Result<ExpectedErrors> {
    let mut expected = if config.default_expected_errors {
        ExpectedErrors::with_defaults()
    } else {
        ExpectedErrors::new()
    };
    for pattern in &config.expected_errors {
        expected
            .add(pattern)
            .map_err(|source| SessionError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
    }
    Ok(expected)
}

fn build_oracles(config: &OracleConfig) -> Result<Vec<Box<dyn TestOracle>>> {
    config
        .oracles
        .iter()
        .map(|name| -> Result<Box<dyn TestOracle>> {
            let kind: OracleKind = name.parse()?;
            Ok(match kind {
                OracleKind::Aggregate => {
                    Box::new(TlpAggregateOracle::new(config.aggregate_tolerance))
                        as Box<dyn TestOracle>
                }
                other => other.build(),
            })
        })
        .collect()
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| SessionError::Output {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}
