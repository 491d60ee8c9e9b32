//! The `tlpfuzz` command.
//!
//! ```bash
//! # Write a default tlpfuzz.toml into the current directory
//! tlpfuzz config init
//!
//! # Run 500 oracle steps against in-process DuckDB
//! tlpfuzz run --seed 7 --steps 500
//!
//! # Inspect the edge map a coverage campaign left behind
//! tlpfuzz coverage tlpfuzz-out/coverage.map --top 20
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{GlobalOptions, RunArgs};

/// tlpfuzz - coverage-guided ternary logic partitioning for SQL engines.
#[derive(Parser)]
#[command(name = "tlpfuzz")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory holding tlpfuzz.toml.
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Extra configuration file, layered over the project files.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Skip ~/.config/tlpfuzz/config.toml.
    #[arg(long, global = true)]
    no_user_config: bool,

    /// Disable colored output. Also honored via `NO_COLOR`.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Run a testing campaign.
    Run(RunArgs),

    /// Summarize a saved coverage map.
    Coverage {
        /// Snapshot written by a coverage campaign.
        map: PathBuf,

        /// Number of hottest edges to list.
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Print JSON instead of tables.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Output format (text, toml, json).
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Load and validate the configuration.
    Validate,

    /// Write a tlpfuzz.toml with default values.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    style::set_no_color(cli.no_color || std::env::var_os("NO_COLOR").is_some());
    let global = GlobalOptions {
        project: cli.project,
        config: cli.config,
        user_config: !cli.no_user_config,
    };

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Run(args) => commands::run::run(&global, args),
        Commands::Coverage { map, top, json } => commands::coverage::run(&map, top, json),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show { format } => commands::config::show(&global, &format),
            ConfigCommands::Validate => commands::config::validate(&global),
            ConfigCommands::Init { force } => commands::config::init(&global.project, force),
        },
    }
}
