//! Layered configuration loading.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::{Paths, TlpfuzzConfig};

pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    explicit_file: Option<PathBuf>,
    user_config: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "TLPF".to_string(),
            explicit_file: None,
            user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Prefix for environment overrides (default `TLPF`).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// A file layered above the project files; it must exist.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.explicit_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Skips `~/.config/tlpfuzz/config.toml`.
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    pub fn load(self) -> Result<TlpfuzzConfig> {
        let defaults = TlpfuzzConfig::default();
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).context("encoding defaults")?);

        let mut files = Vec::new();
        if self.user_config {
            if let Ok(user) = Paths::new().user_config_file() {
                files.push(user);
            }
        }
        files.push(Paths::project_config_file(&self.project_dir));
        files.push(Paths::local_config_file(&self.project_dir));
        for file in files.into_iter().filter(|f| f.exists()) {
            tracing::debug!(file = %file.display(), "loading configuration layer");
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        if let Some(file) = &self.explicit_file {
            anyhow::ensure!(
                file.exists(),
                "configuration file {} does not exist",
                file.display()
            );
            builder = builder.add_source(
                config::File::from(file.clone())
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        // Field names contain underscores, so sections are split on `__`.
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: TlpfuzzConfig = builder
            .build()
            .context("merging configuration sources")?
            .try_deserialize()
            .context("decoding configuration")?;
        loaded.resolve_paths(&self.project_dir);
        loaded.validate().context("validating configuration")?;
        Ok(loaded)
    }

    /// Falls back to validated defaults when loading fails.
    pub fn load_or_default(self) -> TlpfuzzConfig {
        let project_dir = self.project_dir.clone();
        self.load().unwrap_or_else(|err| {
            tracing::warn!(error = %format!("{err:#}"), "using default configuration");
            let mut config = TlpfuzzConfig::default();
            config.resolve_paths(project_dir);
            config
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::ClearCadence;

    fn loader(dir: &Path) -> ConfigLoader {
        ConfigLoader::new()
            .with_project_dir(dir)
            .without_user_config()
            .with_env_prefix("TLPF_LOADER_TEST")
    }

    #[test]
    fn empty_project_gives_defaults() {
        let dir = tempdir().expect("tempdir");
        let config = loader(dir.path()).load().expect("load");
        assert_eq!(config.session.steps, 1000);
        assert_eq!(config.feedback.exponent, 1.5);
        assert!(config.session.output_dir.is_absolute());
        assert!(config.session.output_dir.starts_with(dir.path()));
    }

    #[test]
    fn project_file_overrides_defaults() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("tlpfuzz.toml"),
            r#"
[session]
seed = 99
steps = 25

[coverage]
clear = "per-round"
round_size = 8

[oracle]
oracles = ["where", "norec"]
"#,
        )
        .expect("write project file");

        let config = loader(dir.path()).load().expect("load");
        assert_eq!(config.session.seed, Some(99));
        assert_eq!(config.session.steps, 25);
        assert_eq!(config.coverage.clear_cadence(), ClearCadence::EveryRound(8));
        assert_eq!(config.oracle.oracles, vec!["where", "norec"]);
        // Untouched sections keep their defaults.
        assert_eq!(config.generator.max_rows, 10);
    }

    #[test]
    fn local_and_explicit_files_layer_in_order() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("tlpfuzz.toml"), "[session]\nsteps = 10\n").expect("write");
        fs::write(
            dir.path().join("tlpfuzz.local.toml"),
            "[session]\nsteps = 20\nqueries_per_database = 4\n",
        )
        .expect("write");
        let explicit = dir.path().join("ci.toml");
        fs::write(&explicit, "[session]\nsteps = 30\n").expect("write");

        let config = loader(dir.path()).load().expect("load");
        assert_eq!(config.session.steps, 20);

        let config = loader(dir.path()).with_file(&explicit).load().expect("load");
        assert_eq!(config.session.steps, 30);
        assert_eq!(config.session.queries_per_database, 4);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let err = loader(dir.path())
            .with_file(dir.path().join("absent.toml"))
            .load()
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[test]
    fn invalid_values_are_rejected_and_defaulted() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("tlpfuzz.toml"), "[feedback]\nexponent = 0.5\n")
            .expect("write");
        let err = loader(dir.path()).load().unwrap_err();
        assert!(format!("{err:#}").contains("feedback.exponent"), "{err:#}");

        let config = loader(dir.path()).load_or_default();
        assert_eq!(config.feedback.exponent, 1.5);
    }
}
