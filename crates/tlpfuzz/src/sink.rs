//! Where detected bugs go.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tlpfuzz_oracle::BugReport;
use tracing::info;

use crate::error::{Result, SessionError};

/// A bug as the session saw it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundBug {
    pub found_at: DateTime<Utc>,
    /// Campaign seed; with `step` it identifies the check.
    pub seed: u64,
    pub step: u64,
    /// Whether re-running the stored queries showed the bug again.
    pub reproducible: bool,
    pub report: BugReport,
}

pub trait BugSink {
    fn report(&mut self, bug: &FoundBug) -> Result<()>;

    /// Bugs accepted so far.
    fn count(&self) -> usize;
}

/// Writes each bug as `bug-NNNN.json` plus a `bug-NNNN.sql` script.
#[derive(Debug)]
pub struct BugLog {
    dir: PathBuf,
    written: usize,
}

impl BugLog {
    /// Creates `dir` if needed. Numbering continues after any existing
    /// reports in it.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| SessionError::Output {
            path: dir.clone(),
            source,
        })?;
        let written = fs::read_dir(&dir)
            .map_err(|source| SessionError::Output {
                path: dir.clone(),
                source,
            })?
            .filter_map(std::result::Result::ok)
            .filter(|entry| {
                let name = entry.file_name();
                let name = name.to_string_lossy();
                name.starts_with("bug-") && name.ends_with(".json")
            })
            .count();
        Ok(Self { dir, written })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, path: PathBuf, contents: &str) -> Result<()> {
        fs::write(&path, contents).map_err(|source| SessionError::Output { path, source })
    }
}

impl BugSink for BugLog {
    fn report(&mut self, bug: &FoundBug) -> Result<()> {
        let stem = format!("bug-{:04}", self.written);
        let json = serde_json::to_string_pretty(bug).map_err(|source| SessionError::Encode {
            what: "bug report",
            source,
        })?;
        self.write(self.dir.join(format!("{stem}.json")), &json)?;
        self.write(self.dir.join(format!("{stem}.sql")), &bug.report.to_script())?;
        self.written += 1;
        info!(
            file = %self.dir.join(&stem).display(),
            oracle = %bug.report.oracle,
            "bug report written"
        );
        Ok(())
    }

    fn count(&self) -> usize {
        self.written
    }
}

/// Keeps bugs in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub bugs: Vec<FoundBug>,
}

impl BugSink for MemorySink {
    fn report(&mut self, bug: &FoundBug) -> Result<()> {
        self.bugs.push(bug.clone());
        Ok(())
    }

    fn count(&self) -> usize {
        self.bugs.len()
    }
}
