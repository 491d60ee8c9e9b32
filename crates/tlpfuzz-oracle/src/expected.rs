//! Allow-list of benign engine errors.
//!
//! Random expressions routinely hit conversion failures, overflows and
//! similar errors that say nothing about correctness. A check that runs into
//! one of them is abandoned instead of reported.

use regex::Regex;

use crate::error::ExecutionError;

/// Messages DuckDB and most engines raise for ill-typed random expressions.
pub const DEFAULT_PATTERNS: &[&str] = &[
    r"(?i)conversion error",
    r"(?i)out of range",
    r"(?i)overflow",
    r"(?i)division by zero",
    r"(?i)ambiguous",
    r"(?i)could not convert",
    r"(?i)no function matches",
    r"(?i)cannot compare",
    r"(?i)not implemented",
    r"(?i)must appear in the group by clause",
    r"(?i)invalid input syntax",
];

#[derive(Debug, Clone, Default)]
pub struct ExpectedErrors {
    patterns: Vec<Regex>,
}

impl ExpectedErrors {
    /// An empty allow-list; only timeouts are ignorable.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    /// Treats every error as benign.
    pub fn permissive() -> Self {
        Self {
            patterns: Regex::new("(?s).*").into_iter().collect(),
        }
    }

    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn add(&mut self, pattern: &str) -> Result<(), regex::Error> {
        self.patterns.push(Regex::new(pattern)?);
        Ok(())
    }

    pub fn extend(&mut self, other: &ExpectedErrors) {
        self.patterns.extend(other.patterns.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches_message(&self, message: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(message))
    }

    /// Timeouts are always ignorable; internal executor failures never are.
    pub fn is_expected(&self, error: &ExecutionError) -> bool {
        match error {
            ExecutionError::Timeout(_) => true,
            ExecutionError::Internal(_) => false,
            other => self.matches_message(&other.message()),
        }
    }
}
