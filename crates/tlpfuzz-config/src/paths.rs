//! Where configuration and campaign output live.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::ConfigError;

pub const PROJECT_FILE: &str = "tlpfuzz.toml";
pub const LOCAL_FILE: &str = "tlpfuzz.local.toml";

/// XDG-compliant user directories plus project-relative file names.
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("org", "tlpfuzz", "tlpfuzz"),
        }
    }

    /// `~/.config/tlpfuzz/` on Linux.
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or(ConfigError::NoHomeDirectory)
    }

    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_FILE)
    }

    /// Untracked per-machine overrides.
    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_FILE)
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins `path` onto `base` unless it is already absolute.
pub(crate) fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}
