//! `tlpfuzz run`: one campaign against DuckDB.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tlpfuzz::config::TlpfuzzConfig;
use tlpfuzz::oracle::DuckDbExecutor;
use tlpfuzz::{Session, SessionReport};
use tracing::info;

use super::GlobalOptions;
use crate::style::{self, counts_table, print_heading, print_info_table, print_path};

#[derive(Args)]
pub struct RunArgs {
    /// Campaign seed; random when absent.
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Oracle steps to run.
    #[arg(short = 'n', long)]
    pub steps: Option<u64>,

    /// Oracles to rotate through (comma separated).
    #[arg(short, long, value_delimiter = ',')]
    pub oracle: Vec<String>,

    /// Instrumented target binary; enables coverage feedback.
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// DuckDB database file instead of an in-memory database.
    #[arg(short, long)]
    pub database: Option<PathBuf>,

    /// Directory for bug reports, gates and the session summary.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Print the session report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Exit with an error when any bug was found.
    #[arg(long)]
    pub fail_on_bug: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut TlpfuzzConfig) {
        if let Some(seed) = self.seed {
            config.session.seed = Some(seed);
        }
        if let Some(steps) = self.steps {
            config.session.steps = steps;
        }
        if !self.oracle.is_empty() {
            config.oracle.oracles.clone_from(&self.oracle);
        }
        if let Some(target) = &self.target {
            config.coverage.target = Some(target.clone());
            config.coverage.enabled = true;
        }
        if let Some(database) = &self.database {
            config.session.database = Some(database.clone());
        }
        if let Some(output) = &self.output {
            config.session.output_dir.clone_from(output);
        }
    }
}

pub fn run(global: &GlobalOptions, args: RunArgs) -> Result<()> {
    let mut config = global.load_config()?;
    args.apply(&mut config);

    let executor = match &config.session.database {
        Some(path) => DuckDbExecutor::open(path)
            .with_context(|| format!("opening DuckDB database {}", path.display()))?,
        None => DuckDbExecutor::new().context("opening in-memory DuckDB")?,
    }
    .with_statement_timeout(config.oracle.statement_timeout());

    let output_dir = config.session.output_dir.clone();
    let mut session = Session::with_bug_log(config, executor).context("starting session")?;
    if session.config().coverage.enabled {
        let pid = session
            .start_coverage()
            .context("starting the coverage target")?;
        info!(pid, "coverage target running");
    }

    session.run().context("campaign aborted")?;
    let report = session.finish().context("finishing session")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &output_dir);
    }

    if args.fail_on_bug && report.stats.bugs > 0 {
        anyhow::bail!("{} bug(s) found", report.stats.bugs);
    }
    Ok(())
}

fn rate(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |r| format!("{:.1}%", r * 100.0))
}

fn print_report(report: &SessionReport, output_dir: &std::path::Path) {
    let stats = &report.stats;
    print_heading("Campaign");
    print_info_table(&[
        ("seed", stats.seed.to_string()),
        ("steps", stats.steps.to_string()),
        ("databases", stats.databases.to_string()),
        (
            "statements",
            format!("{} ({} failed)", stats.statements, stats.failed_statements),
        ),
        (
            "oracle errors",
            format!("{} ({} exhausted steps)", stats.oracle_errors, stats.exhausted_steps),
        ),
        ("query success", rate(stats.query_success_rate)),
        ("statement success", rate(stats.statement_success_rate)),
        (
            "disabled",
            format!(
                "{} features, {} composites",
                stats.disabled_features, stats.disabled_composites
            ),
        ),
        (
            "elapsed",
            format!("{:.1}s ({:.1} checks/s)", stats.elapsed_secs, stats.rate()),
        ),
    ]);

    let mut rows: Vec<Vec<String>> = stats
        .oracles
        .iter()
        .map(|(name, c)| {
            vec![
                name.clone(),
                c.checks.to_string(),
                c.passed.to_string(),
                c.skips.to_string(),
                c.failures.to_string(),
                c.bugs.to_string(),
            ]
        })
        .collect();
    let total = stats.totals();
    rows.push(vec![
        "total".into(),
        total.checks.to_string(),
        total.passed.to_string(),
        total.skips.to_string(),
        total.failures.to_string(),
        total.bugs.to_string(),
    ]);
    println!(
        "{}",
        counts_table(&["oracle", "checks", "passed", "skipped", "errors", "mismatches"], &rows)
    );

    if let Some(coverage) = &report.coverage {
        print!("{}", coverage.to_human_readable());
    }

    if stats.bugs == 0 {
        style::print_success("no bugs found");
    } else {
        style::print_warn(&format!(
            "{} bug(s) found, {} duplicate(s) suppressed",
            stats.bugs, stats.duplicate_bugs
        ));
        print_path("reports", &output_dir.join("bugs"));
    }
    print_path("summary", &output_dir.join("session.json"));
}
