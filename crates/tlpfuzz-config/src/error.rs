use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("cannot render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    /// A value is out of range or inconsistent with another one.
    #[error("invalid `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("no home directory to place user configuration in")]
    NoHomeDirectory,
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            reason: reason.into(),
        }
    }
}
