//! Per-feature usage and outcome bookkeeping.
//!
//! Every generated statement produces one [`ExecutionRecord`]: which features
//! (and composite keys) the generator used, how often, and whether the
//! statement executed successfully. [`ExecutionScoreboard::update`] folds new
//! records into cumulative tallies and gates features that never succeed.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tlpfuzz_types::{CompositeKey, FeatureId, FeatureRegistry, GeneratorNode};
use tracing::{debug, info, warn};

use crate::error::{FeedbackError, Result};
use crate::table::{GatingPolicy, OptionTable, Tally};

/// Average above which the untyped-expression meta feature is enabled.
const UNTYPE_THRESHOLD: f64 = 0.5;

/// Primary part of the composite key that gates a whole function.
pub const FUNCTION_GATE: &str = "FUNCTION";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub features: BTreeMap<FeatureId, u32>,
    pub composites: BTreeMap<CompositeKey, u32>,
    pub success: bool,
    pub is_query: bool,
}

impl ExecutionRecord {
    pub fn feature_ids(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.features.keys().copied()
    }

    pub fn uses(&self, feature: FeatureId) -> u32 {
        self.features.get(&feature).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounter {
    pub successes: u64,
    pub total: u64,
}

impl OutcomeCounter {
    fn add(&mut self, success: bool) {
        self.total += 1;
        if success {
            self.successes += 1;
        }
    }

    pub fn rate(&self) -> Option<f64> {
        (self.total > 0).then(|| self.successes as f64 / self.total as f64)
    }
}

/// Features of a reported bug, for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BugSignature {
    features: BTreeSet<FeatureId>,
    failed: bool,
}

impl BugSignature {
    fn of(record: &ExecutionRecord) -> Self {
        let untype = FeatureId::from(GeneratorNode::UntypeExpr);
        Self {
            features: record.feature_ids().filter(|f| *f != untype).collect(),
            failed: !record.success,
        }
    }
}

/// Gate changes made by one [`ExecutionScoreboard::update`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateChanges {
    pub enabled: Vec<String>,
    pub disabled: Vec<String>,
}

impl GateChanges {
    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionScoreboard {
    history: Vec<ExecutionRecord>,
    folded: usize,
    working: Option<ExecutionRecord>,

    features: OptionTable<FeatureId>,
    composites: OptionTable<CompositeKey>,
    feature_tally: HashMap<FeatureId, Tally>,
    composite_tally: HashMap<CompositeKey, Tally>,
    feature_policy: GatingPolicy,
    composite_policy: GatingPolicy,

    bugs: Vec<BugSignature>,
    queries: OutcomeCounter,
    statements: OutcomeCounter,
}

impl Default for ExecutionScoreboard {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionScoreboard {
    pub fn new() -> Self {
        Self::with_policies(GatingPolicy::default(), GatingPolicy::default())
    }

    /// Untyped expressions start disabled; typed generation is tried first.
    pub fn with_policies(feature_policy: GatingPolicy, composite_policy: GatingPolicy) -> Self {
        let mut features = OptionTable::default();
        features.set(FeatureId::from(GeneratorNode::UntypeExpr), false);
        Self {
            history: Vec::new(),
            folded: 0,
            working: None,
            features,
            composites: OptionTable::default(),
            feature_tally: HashMap::new(),
            composite_tally: HashMap::new(),
            feature_policy,
            composite_policy,
            bugs: Vec::new(),
            queries: OutcomeCounter::default(),
            statements: OutcomeCounter::default(),
        }
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Starts a new working record, discarding an uncommitted one.
    pub fn begin_record(&mut self) {
        if self.working.is_some() {
            debug!("discarding uncommitted execution record");
        }
        self.working = Some(ExecutionRecord::default());
    }

    fn working(&mut self) -> &mut ExecutionRecord {
        self.working.get_or_insert_with(ExecutionRecord::default)
    }

    pub fn add_usage(&mut self, feature: FeatureId) {
        *self.working().features.entry(feature).or_insert(0) += 1;
    }

    pub fn add_composite_usage(&mut self, key: CompositeKey) {
        *self.working().composites.entry(key).or_insert(0) += 1;
    }

    pub fn set_query(&mut self, is_query: bool) {
        self.working().is_query = is_query;
    }

    pub fn set_outcome(&mut self, success: bool) {
        self.working().success = success;
    }

    /// Features recorded so far in the working record.
    pub fn working_features(&self) -> Vec<FeatureId> {
        self.working
            .as_ref()
            .map(|r| r.feature_ids().collect())
            .unwrap_or_default()
    }

    /// Appends the working record to the history. Returns false when there
    /// was nothing to commit.
    pub fn commit(&mut self) -> bool {
        let Some(record) = self.working.take() else {
            return false;
        };
        if record.is_query {
            self.queries.add(record.success);
        } else {
            self.statements.add(record.success);
        }
        self.history.push(record);
        true
    }

    /// Drops the working record without committing it.
    pub fn discard(&mut self) {
        self.working = None;
    }

    pub fn history(&self) -> &[ExecutionRecord] {
        &self.history
    }

    pub fn last_record(&self) -> Option<&ExecutionRecord> {
        self.history.last()
    }

    // ------------------------------------------------------------------
    // Gates
    // ------------------------------------------------------------------

    pub fn is_enabled(&self, feature: FeatureId) -> bool {
        self.features.is_enabled(&feature)
    }

    pub fn set_enabled(&mut self, feature: FeatureId, enabled: bool) {
        self.features.set(feature, enabled);
    }

    pub fn composite_enabled(&self, key: &CompositeKey) -> bool {
        self.composites.is_enabled(key)
    }

    pub fn set_composite(&mut self, key: CompositeKey, enabled: bool) {
        self.composites.set(key, enabled);
    }

    /// Whether the catalog function `name` may be generated at all.
    pub fn function_enabled(&self, name: &str) -> bool {
        self.composite_enabled(&CompositeKey::new(FUNCTION_GATE, name))
    }

    pub fn feature_table(&self) -> &OptionTable<FeatureId> {
        &self.features
    }

    pub fn composite_table(&self) -> &OptionTable<CompositeKey> {
        &self.composites
    }

    /// Folds records committed since the last call and re-gates every key
    /// with a tally.
    pub fn update(&mut self, registry: &FeatureRegistry) -> GateChanges {
        for record in &self.history[self.folded..] {
            for (feature, usage) in &record.features {
                self.feature_tally
                    .entry(*feature)
                    .or_default()
                    .add(*usage, record.success);
            }
            for (key, usage) in &record.composites {
                self.composite_tally
                    .entry(key.clone())
                    .or_default()
                    .add(*usage, record.success);
            }
        }
        self.folded = self.history.len();

        let mut changes = GateChanges::default();
        let untype = FeatureId::from(GeneratorNode::UntypeExpr);

        for (feature, tally) in &self.feature_tally {
            if !self.feature_policy.admits(tally) {
                continue;
            }
            let average = tally.average();
            let changed = if *feature == untype {
                // Re-evaluated only while enabled; once off it stays off.
                if !self.features.is_enabled(feature) {
                    continue;
                }
                let enabled = average > UNTYPE_THRESHOLD;
                self.features.set(*feature, enabled);
                (!enabled).then_some(false)
            } else {
                self.features.gate(*feature, average)
            };
            if let Some(enabled) = changed {
                let name = registry.display(*feature);
                debug!(feature = %name, enabled, average, "feature gate changed");
                if enabled {
                    changes.enabled.push(name);
                } else {
                    changes.disabled.push(name);
                }
            }
        }

        for (key, tally) in &self.composite_tally {
            if !self.composite_policy.admits(tally) {
                continue;
            }
            if let Some(enabled) = self.composites.gate(key.clone(), tally.average()) {
                debug!(key = %key, enabled, "composite gate changed");
                if enabled {
                    changes.enabled.push(key.to_string());
                } else {
                    changes.disabled.push(key.to_string());
                }
            }
        }

        changes.enabled.sort();
        changes.disabled.sort();
        changes
    }

    /// Disables `FUNCTION-<name>` for every function with an argument slot
    /// that no datatype may fill (`<name>-<slot><TYPE>` all disabled).
    pub fn derive_function_gates<'a, I>(&mut self, functions: I, types: &[&str]) -> usize
    where
        I: IntoIterator<Item = (&'a str, usize)>,
    {
        let mut disabled = 0;
        for (name, arity) in functions {
            let blocked = (0..arity).any(|slot| {
                !types.iter().any(|ty| {
                    self.composites
                        .is_enabled(&CompositeKey::new(name, format!("{slot}{ty}")))
                })
            });
            if blocked {
                self.composites
                    .set(CompositeKey::new(FUNCTION_GATE, name), false);
                disabled += 1;
            }
        }
        disabled
    }

    // ------------------------------------------------------------------
    // Files
    // ------------------------------------------------------------------

    /// Reads a deny list: one name per line, `-` marks a composite key.
    ///
    /// Entries become disabled unless already present. A missing file is
    /// treated as empty.
    pub fn load_deny_list(&mut self, path: &Path, registry: &FeatureRegistry) -> Result<usize> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "deny list not found, nothing disabled");
                return Ok(0);
            }
            Err(source) => {
                return Err(FeedbackError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let mut loaded = 0;
        for name in text.lines().map(str::trim) {
            if name.is_empty() || name.starts_with('#') {
                continue;
            }
            if CompositeKey::is_composite(name) {
                match CompositeKey::parse(name) {
                    Ok(key) => {
                        if self.composites.set_if_absent(key, false) {
                            loaded += 1;
                        }
                    }
                    Err(e) => warn!(entry = name, error = %e, "skipping deny-list entry"),
                }
            } else if let Some(feature) = registry.lookup(name) {
                if self.features.set_if_absent(feature, false) {
                    loaded += 1;
                }
            } else {
                warn!(entry = name, "unknown feature in deny list");
            }
        }
        info!(path = %path.display(), loaded, "deny list applied");
        Ok(loaded)
    }

    /// Writes `<name> : <bool>` for every tracked feature and composite key.
    pub fn persist(&self, path: &Path, registry: &FeatureRegistry) -> Result<()> {
        let mut features: Vec<_> = self.features.iter().collect();
        features.sort_by_key(|(id, _)| **id);
        let mut composites: Vec<_> = self.composites.iter().collect();
        composites.sort_by(|a, b| a.0.cmp(b.0));

        let mut out = String::new();
        for (id, enabled) in features {
            out.push_str(&format!("{} : {enabled}\n", registry.display(*id)));
        }
        for (key, enabled) in composites {
            out.push_str(&format!("{key} : {enabled}\n"));
        }

        let write_err = |source| FeedbackError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        fs::write(path, out).map_err(write_err)?;
        info!(
            path = %path.display(),
            features = self.features.len(),
            composites = self.composites.len(),
            "persisted gates"
        );
        Ok(())
    }

    /// Writes the cumulative tally behind every gate, one
    /// `<name> : average=<a> success=<s> records=<n> enabled=<bool>` line per
    /// feature and composite key seen by [`update`](Self::update).
    pub fn save_statistics(&self, path: &Path, registry: &FeatureRegistry) -> Result<()> {
        let mut features: Vec<_> = self.feature_tally.iter().collect();
        features.sort_by_key(|(id, _)| **id);
        let mut composites: Vec<_> = self.composite_tally.iter().collect();
        composites.sort_by(|a, b| a.0.cmp(b.0));

        let line = |name: &str, tally: &Tally, enabled: bool| {
            format!(
                "{name} : average={:.4} success={} records={} enabled={enabled}\n",
                tally.average(),
                tally.success,
                tally.records
            )
        };
        let mut out = String::new();
        for (id, tally) in features {
            out.push_str(&line(&registry.display(*id), tally, self.is_enabled(*id)));
        }
        for (key, tally) in composites {
            out.push_str(&line(key.as_str(), tally, self.composite_enabled(key)));
        }

        let write_err = |source| FeedbackError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        fs::write(path, out).map_err(write_err)?;
        debug!(
            path = %path.display(),
            features = self.feature_tally.len(),
            composites = self.composite_tally.len(),
            "saved gate statistics"
        );
        Ok(())
    }

    /// Restores gates written by [`persist`](Self::persist).
    pub fn load_persisted(&mut self, path: &Path, registry: &FeatureRegistry) -> Result<usize> {
        let text = fs::read_to_string(path).map_err(|source| FeedbackError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let mut loaded = 0;
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = || FeedbackError::MalformedEntry {
                path: path.to_path_buf(),
                line: index + 1,
                text: line.to_string(),
            };
            let (name, value) = line.rsplit_once(':').ok_or_else(malformed)?;
            let (name, enabled) = (
                name.trim(),
                value.trim().parse::<bool>().map_err(|_| malformed())?,
            );

            if CompositeKey::is_composite(name) {
                let key = CompositeKey::parse(name).map_err(|_| malformed())?;
                self.composites.set(key, enabled);
            } else if let Some(feature) = registry.lookup(name) {
                self.features.set(feature, enabled);
            } else {
                warn!(entry = name, "unknown feature in persisted gates");
                continue;
            }
            loaded += 1;
        }
        Ok(loaded)
    }

    // ------------------------------------------------------------------
    // Statistics and bug de-duplication
    // ------------------------------------------------------------------

    pub fn query_stats(&self) -> OutcomeCounter {
        self.queries
    }

    pub fn statement_stats(&self) -> OutcomeCounter {
        self.statements
    }

    /// Remembers the features of the last committed record as a reported bug.
    pub fn remember_bug(&mut self) {
        if let Some(record) = self.history.last() {
            self.bugs.push(BugSignature::of(record));
        }
    }

    /// True when the last record uses every feature of a remembered bug
    /// with the same outcome class.
    pub fn is_duplicate_bug(&self) -> bool {
        let Some(record) = self.history.last() else {
            return false;
        };
        let current = BugSignature::of(record);
        self.bugs.iter().any(|bug| {
            bug.failed == current.failed
                && if bug.features.is_empty() {
                    current.features.is_empty()
                } else {
                    bug.features.is_subset(&current.features)
                }
        })
    }

    pub fn remembered_bugs(&self) -> usize {
        self.bugs.len()
    }
}
