//! Subcommand implementations.

use std::path::PathBuf;

use anyhow::Result;
use tlpfuzz::config::{ConfigLoader, TlpfuzzConfig};

pub mod config;
pub mod coverage;
pub mod run;
pub mod version;

pub use run::RunArgs;

/// Flags shared by every subcommand.
pub struct GlobalOptions {
    pub project: PathBuf,
    pub config: Option<PathBuf>,
    pub user_config: bool,
}

impl GlobalOptions {
    fn loader(&self) -> ConfigLoader {
        let mut loader = ConfigLoader::new().with_project_dir(&self.project);
        if let Some(file) = &self.config {
            loader = loader.with_file(file);
        }
        if !self.user_config {
            loader = loader.without_user_config();
        }
        loader
    }

    /// Loads the layered configuration for the project.
    pub fn load_config(&self) -> Result<TlpfuzzConfig> {
        self.loader().load()
    }
}
