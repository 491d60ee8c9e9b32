//! Enable/disable tables and the gating rule.

use std::collections::HashMap;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

/// Cumulative (success-weighted usage, records) sums for one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    /// Σ usage × outcome over every record containing the key.
    pub success: u64,
    /// Number of records containing the key.
    pub records: u64,
}

impl Tally {
    pub fn add(&mut self, usage: u32, success: bool) {
        if success {
            self.success += u64::from(usage);
        }
        self.records += 1;
    }

    pub fn average(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.success as f64 / self.records as f64
        }
    }
}

/// When a tallied key is eligible for gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatingPolicy {
    /// Keys seen in at most this many records are left alone...
    pub min_observations: u64,
    /// ...unless quick start is on and the key has already succeeded.
    pub quick_start: bool,
}

impl Default for GatingPolicy {
    fn default() -> Self {
        Self {
            min_observations: 0,
            quick_start: true,
        }
    }
}

impl GatingPolicy {
    pub fn admits(&self, tally: &Tally) -> bool {
        tally.records > self.min_observations || (self.quick_start && tally.success > 0)
    }
}

/// Key → enabled. Absent keys are enabled.
///
/// An explicit `true` entry is pinned: later statistics never flip it back.
#[derive(Debug, Clone)]
pub struct OptionTable<K> {
    entries: HashMap<K, bool>,
}

impl<K> Default for OptionTable<K> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash> OptionTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, key: &K) -> bool {
        self.entries.get(key).copied().unwrap_or(true)
    }

    pub fn is_pinned(&self, key: &K) -> bool {
        self.entries.get(key).copied() == Some(true)
    }

    pub fn get(&self, key: &K) -> Option<bool> {
        self.entries.get(key).copied()
    }

    pub fn set(&mut self, key: K, enabled: bool) {
        self.entries.insert(key, enabled);
    }

    /// Returns true when the entry was inserted.
    pub fn set_if_absent(&mut self, key: K, enabled: bool) -> bool {
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, enabled);
        true
    }

    /// Applies the gating rule. Returns the new state when it changed.
    pub fn gate(&mut self, key: K, average: f64) -> Option<bool> {
        if self.is_pinned(&key) {
            return None;
        }
        let enabled = average > 0.0;
        let previous = self.entries.insert(key, enabled);
        (previous != Some(enabled)).then_some(enabled)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, bool)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn disabled_count(&self) -> usize {
        self.entries.values().filter(|enabled| !**enabled).count()
    }
}
