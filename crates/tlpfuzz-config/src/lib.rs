//! Configuration for tlpfuzz campaigns
//!
//! Sources, lowest precedence first:
//! 1. Built-in defaults
//! 2. `~/.config/tlpfuzz/config.toml` (user defaults)
//! 3. `tlpfuzz.toml` (project config)
//! 4. `tlpfuzz.local.toml` (untracked local overrides)
//! 5. An explicit file passed to [`ConfigLoader::with_file`]
//! 6. `TLPF_*` environment variables, sections separated by `__`
//!    (`TLPF_COVERAGE__MAP_SIZE=131072`)
//!
//! CLI arguments are applied on top by the binary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_FILE, PROJECT_FILE, Paths};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlpfuzzConfig {
    pub session: SessionConfig,
    pub coverage: CoverageConfig,
    pub feedback: FeedbackConfig,
    pub oracle: OracleConfig,
    pub generator: GeneratorConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// RNG seed; drawn from the OS when absent.
    pub seed: Option<u64>,
    /// Oracle checks to run before stopping.
    pub steps: u64,
    /// Checks per generated database before it is rebuilt.
    pub queries_per_database: u64,
    /// Bug reports, gate file and coverage snapshots go here.
    pub output_dir: PathBuf,
    /// DuckDB file; in-memory when absent.
    pub database: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seed: None,
            steps: 1000,
            queries_per_database: 100,
            output_dir: PathBuf::from("tlpfuzz-out"),
            database: None,
        }
    }
}

/// When the coverage map is zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClearMode {
    PerStatement,
    PerRound,
    Never,
}

/// Resolved clearing schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearCadence {
    PerStatement,
    /// Every `n` statements.
    EveryRound(u64),
    Never,
}

impl ClearCadence {
    /// Whether the map is cleared before statement number `executed`
    /// (zero-based).
    pub fn clears_before(self, executed: u64) -> bool {
        match self {
            ClearCadence::PerStatement => true,
            ClearCadence::EveryRound(n) => n > 0 && executed % n == 0,
            ClearCadence::Never => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    pub enabled: bool,
    /// Instrumented target binary.
    pub target: Option<PathBuf>,
    pub args: Vec<String>,
    /// Extra variables for the target, on top of the AFL ones.
    pub env: BTreeMap<String, String>,
    /// Must match the target build.
    pub map_size: usize,
    /// `host:port` polled until the target accepts connections. Without it
    /// the target only has to stay alive through the warm-up.
    pub ready_address: Option<String>,
    pub warmup_deadline_ms: u64,
    pub poll_interval_ms: u64,
    pub shutdown_grace_ms: u64,
    pub clear: ClearMode,
    /// Statements per round for `clear = "per-round"`.
    pub round_size: u64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            map_size: 65_536,
            ready_address: None,
            warmup_deadline_ms: 30_000,
            poll_interval_ms: 100,
            shutdown_grace_ms: 3_000,
            clear: ClearMode::PerStatement,
            round_size: 100,
        }
    }
}

impl CoverageConfig {
    pub fn clear_cadence(&self) -> ClearCadence {
        match self.clear {
            ClearMode::PerStatement => ClearCadence::PerStatement,
            ClearMode::PerRound => ClearCadence::EveryRound(self.round_size),
            ClearMode::Never => ClearCadence::Never,
        }
    }

    pub fn warmup_deadline(&self) -> Duration {
        Duration::from_millis(self.warmup_deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Weight features by coverage; when off, choices are uniform but gates
    /// still apply.
    pub weighting: bool,
    /// Sharpening exponent applied to weights, > 1.
    pub exponent: f64,
    pub recompute_every: u64,
    /// Re-derive gates after this many committed statements.
    pub update_every: u64,
    pub min_observations: u64,
    pub quick_start: bool,
    pub composite_min_observations: u64,
    pub composite_quick_start: bool,
    /// Features disabled at startup, one name per line.
    pub deny_list: Option<PathBuf>,
    /// `<feature> : <bool>` lines restored at startup and written at exit.
    pub gate_file: Option<PathBuf>,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            weighting: true,
            exponent: 1.5,
            recompute_every: 1,
            update_every: 50,
            min_observations: 0,
            quick_start: true,
            composite_min_observations: 0,
            composite_quick_start: true,
            deny_list: None,
            gate_file: Some(PathBuf::from("tlpfuzz-out/gates.txt")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Oracles run round-robin: `where`, `having`, `group_by`, `distinct`,
    /// `aggregate`, `norec`.
    pub oracles: Vec<String>,
    /// Attempts per step when a check is abandoned.
    pub max_attempts: u32,
    /// Start from the built-in benign error patterns.
    pub default_expected_errors: bool,
    /// Extra benign error regexes.
    pub expected_errors: Vec<String>,
    pub statement_timeout_ms: Option<u64>,
    pub aggregate_tolerance: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            oracles: ["where", "having", "group_by", "distinct", "aggregate", "norec"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_attempts: 3,
            default_expected_errors: true,
            expected_errors: Vec::new(),
            statement_timeout_ms: None,
            aggregate_tolerance: 1e-6,
        }
    }
}

impl OracleConfig {
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub max_depth: u32,
    pub max_tables: usize,
    /// NATURAL LEFT/RIGHT/FULL JOIN; not every dialect accepts them.
    pub natural_outer_join: bool,
    pub null_ratio: f64,
    /// Tables per generated database.
    pub tables: usize,
    pub max_columns: usize,
    pub max_rows: usize,
    /// Random UPDATE/DELETE/index/view statements after the initial inserts.
    pub extra_statements: usize,
    /// Let extra statements change engine parameters with `SET`.
    pub set_parameters: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_tables: 2,
            natural_outer_join: false,
            null_ratio: 0.05,
            tables: 2,
            max_columns: 3,
            max_rows: 10,
            extra_statements: 5,
            set_parameters: true,
        }
    }
}

impl TlpfuzzConfig {
    /// Loads from the default locations under the current directory.
    pub fn load() -> anyhow::Result<Self> {
        ConfigLoader::new().load()
    }

    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Reads exactly one TOML file, without layering.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Resolves relative paths against `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        let base = base_dir.as_ref();
        paths::resolve(base, &mut self.session.output_dir);
        for path in [
            self.session.database.as_mut(),
            self.feedback.deny_list.as_mut(),
            self.feedback.gate_file.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            paths::resolve(base, path);
        }
        // Bare program names are looked up on PATH.
        if let Some(target) = self.coverage.target.as_mut() {
            if target.components().count() > 1 {
                paths::resolve(base, target);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.queries_per_database == 0 {
            return Err(ConfigError::invalid(
                "session.queries_per_database",
                "must be at least 1",
            ));
        }
        if self.coverage.map_size == 0 {
            return Err(ConfigError::invalid("coverage.map_size", "must be non-zero"));
        }
        if self.coverage.enabled && self.coverage.target.is_none() {
            return Err(ConfigError::invalid(
                "coverage.target",
                "required when coverage is enabled",
            ));
        }
        if self.coverage.clear == ClearMode::PerRound && self.coverage.round_size == 0 {
            return Err(ConfigError::invalid("coverage.round_size", "must be at least 1"));
        }
        if !(self.feedback.exponent > 1.0 && self.feedback.exponent.is_finite()) {
            return Err(ConfigError::invalid(
                "feedback.exponent",
                format!("{} is not greater than 1", self.feedback.exponent),
            ));
        }
        if self.feedback.recompute_every == 0 || self.feedback.update_every == 0 {
            return Err(ConfigError::invalid(
                "feedback.recompute_every",
                "cadences must be at least 1",
            ));
        }
        if self.oracle.max_attempts == 0 {
            return Err(ConfigError::invalid("oracle.max_attempts", "must be at least 1"));
        }
        if self.oracle.oracles.is_empty() {
            return Err(ConfigError::invalid("oracle.oracles", "no oracle selected"));
        }
        if !(0.0..=1.0).contains(&self.generator.null_ratio) {
            return Err(ConfigError::invalid(
                "generator.null_ratio",
                format!("{} is outside [0, 1]", self.generator.null_ratio),
            ));
        }
        if self.generator.tables == 0 || self.generator.max_columns == 0 {
            return Err(ConfigError::invalid(
                "generator.tables",
                "databases need at least one table with one column",
            ));
        }
        Ok(())
    }
}
