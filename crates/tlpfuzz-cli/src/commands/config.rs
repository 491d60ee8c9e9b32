//! Configuration management commands.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tlpfuzz::config::{Paths, TlpfuzzConfig};

use super::GlobalOptions;
use crate::style::{
    print_error, print_heading, print_hint, print_info_table, print_labeled, print_path,
    print_success,
};

/// Show the effective configuration.
pub fn show(global: &GlobalOptions, format: &str) -> Result<()> {
    let config = global.load_config()?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&config)?),
        "toml" => print!("{}", config.to_toml()?),
        "text" => print_text(&config),
        other => anyhow::bail!("unknown format '{other}' (expected text, toml or json)"),
    }
    Ok(())
}

fn opt_path(path: Option<&Path>) -> String {
    path.map_or_else(|| "-".to_string(), |p| p.display().to_string())
}

fn print_text(config: &TlpfuzzConfig) {
    let s = &config.session;
    print_heading("Session");
    print_info_table(&[
        ("seed", s.seed.map_or_else(|| "random".into(), |v| v.to_string())),
        ("steps", s.steps.to_string()),
        ("queries per database", s.queries_per_database.to_string()),
        ("output", s.output_dir.display().to_string()),
        ("database", opt_path(s.database.as_deref())),
    ]);

    let c = &config.coverage;
    print_heading("Coverage");
    print_info_table(&[
        ("enabled", c.enabled.to_string()),
        ("target", opt_path(c.target.as_deref())),
        ("args", c.args.join(" ")),
        ("map size", c.map_size.to_string()),
        ("clear", format!("{:?}", c.clear_cadence())),
    ]);

    let f = &config.feedback;
    print_heading("Feedback");
    print_info_table(&[
        ("weighting", f.weighting.to_string()),
        ("exponent", f.exponent.to_string()),
        ("update every", f.update_every.to_string()),
        ("deny list", opt_path(f.deny_list.as_deref())),
        ("gate file", opt_path(f.gate_file.as_deref())),
    ]);

    let o = &config.oracle;
    print_heading("Oracles");
    print_info_table(&[
        ("oracles", o.oracles.join(", ")),
        ("max attempts", o.max_attempts.to_string()),
        (
            "statement timeout",
            o.statement_timeout_ms
                .map_or_else(|| "none".into(), |ms| format!("{ms}ms")),
        ),
    ]);

    let g = &config.generator;
    print_heading("Generator");
    print_info_table(&[
        ("max depth", g.max_depth.to_string()),
        ("tables", g.tables.to_string()),
        ("max columns", g.max_columns.to_string()),
        ("max rows", g.max_rows.to_string()),
        ("null ratio", g.null_ratio.to_string()),
    ]);
}

/// Validate configuration files.
pub fn validate(global: &GlobalOptions) -> Result<()> {
    print_labeled("project", &global.project.display().to_string());
    match global.load_config() {
        Ok(_) => {
            print_success("configuration is valid");
            Ok(())
        }
        Err(e) => {
            print_error("configuration is invalid");
            Err(e)
        }
    }
}

/// Write a default `tlpfuzz.toml`.
pub fn init(project: &Path, force: bool) -> Result<()> {
    let path = Paths::project_config_file(project);
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    fs::create_dir_all(project)
        .with_context(|| format!("creating {}", project.display()))?;
    let contents = TlpfuzzConfig::default().to_toml()?;
    fs::write(&path, contents).with_context(|| format!("writing {}", path.display()))?;

    print_success("wrote default configuration");
    print_path("file", &path);
    print_hint("edit coverage.target to enable coverage feedback");
    Ok(())
}
