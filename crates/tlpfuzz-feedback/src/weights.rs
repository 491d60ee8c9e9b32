//! Mutual-information feature weighting.
//!
//! Each trial is one executed statement: the set of features the generator
//! used and the coverage snapshot it produced. For every (feature, edge) pair
//! the engine keeps a 2×2 contingency table over all trials and scores the
//! feature by how much information it carries about rarely hit edges.
//!
//! Memory: one dense `u32` row of `map_size` counters per feature that has
//! ever been active, allocated on first activation. See
//! [`FeatureWeightEngine::memory_footprint`].

use tlpfuzz_types::FeatureId;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightConfig {
    /// Sharpening exponent applied to weights before normalising. Must be > 1.
    pub exponent: f64,
    /// Recompute cached probabilities every this many trials.
    pub recompute_every: u64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            exponent: 1.5,
            recompute_every: 1,
        }
    }
}

/// `1 / sqrt(1 + hits)`: rarely hit edges count more.
pub fn novelty(cumulative_hits: u64) -> f64 {
    1.0 / (1.0 + cumulative_hits as f64).sqrt()
}

/// Mutual information (bits) between "feature active" and "edge hit".
///
/// `both` trials had both, `feature` trials had the feature, `edge` trials
/// hit the edge, out of `trials`. Zero cells contribute nothing; a zero
/// marginal yields zero.
pub fn mutual_information(both: u64, feature: u64, edge: u64, trials: u64) -> f64 {
    if trials == 0 || feature == 0 || edge == 0 || feature >= trials || edge >= trials {
        return 0.0;
    }
    let n = trials as f64;
    let f1 = feature as f64 / n;
    let e1 = edge as f64 / n;
    let (f0, e0) = (1.0 - f1, 1.0 - e1);

    let n11 = both;
    let n10 = feature - both;
    let n01 = edge - both;
    let n00 = trials + both - feature - edge;

    let cell = |count: u64, pf: f64, pe: f64| {
        if count == 0 {
            0.0
        } else {
            let p = count as f64 / n;
            p * (p / (pf * pe)).log2()
        }
    };

    cell(n11, f1, e1) + cell(n10, f1, e0) + cell(n01, f0, e1) + cell(n00, f0, e0)
}

/// Cumulative trial statistics. Monotone until [`clear`](Self::clear).
#[derive(Debug, Clone)]
pub struct FeatureStatistics {
    map_size: usize,
    trials: u64,
    feature_active: Vec<u64>,
    edge_active: Vec<u64>,
    edge_hits: Vec<u64>,
    co_active: Vec<Option<Box<[u32]>>>,
    touched: Vec<usize>,
}

impl FeatureStatistics {
    pub fn new(features: usize, map_size: usize) -> Self {
        Self {
            map_size,
            trials: 0,
            feature_active: vec![0; features],
            edge_active: vec![0; map_size],
            edge_hits: vec![0; map_size],
            co_active: vec![None; features],
            touched: Vec::new(),
        }
    }

    fn ensure_features(&mut self, features: usize) {
        if features > self.feature_active.len() {
            self.feature_active.resize(features, 0);
            self.co_active.resize(features, None);
        }
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    pub fn feature_activations(&self, feature: FeatureId) -> u64 {
        self.feature_active.get(feature.index()).copied().unwrap_or(0)
    }

    pub fn edge_activations(&self, edge: usize) -> u64 {
        self.edge_active.get(edge).copied().unwrap_or(0)
    }

    pub fn cumulative_hits(&self, edge: usize) -> u64 {
        self.edge_hits.get(edge).copied().unwrap_or(0)
    }

    pub fn co_activations(&self, feature: FeatureId, edge: usize) -> u64 {
        self.co_active
            .get(feature.index())
            .and_then(Option::as_ref)
            .and_then(|row| row.get(edge))
            .map_or(0, |c| u64::from(*c))
    }

    /// Edges hit in at least one trial, in first-hit order.
    pub fn touched_edges(&self) -> &[usize] {
        &self.touched
    }

    pub fn allocated_rows(&self) -> usize {
        self.co_active.iter().filter(|row| row.is_some()).count()
    }

    fn record(&mut self, active: &[usize], snapshot: &[u8]) {
        self.trials += 1;
        for &f in active {
            self.feature_active[f] += 1;
            if self.co_active[f].is_none() {
                self.co_active[f] = Some(vec![0u32; self.map_size].into_boxed_slice());
            }
        }

        for (edge, &hits) in snapshot.iter().enumerate().take(self.map_size) {
            if hits == 0 {
                continue;
            }
            if self.edge_active[edge] == 0 {
                self.touched.push(edge);
            }
            self.edge_active[edge] += 1;
            self.edge_hits[edge] += u64::from(hits);
            for &f in active {
                if let Some(row) = self.co_active[f].as_mut() {
                    row[edge] = row[edge].saturating_add(1);
                }
            }
        }
    }

    pub fn clear(&mut self) {
        let features = self.feature_active.len();
        *self = Self::new(features, self.map_size);
    }
}

#[derive(Debug, Clone)]
pub struct FeatureWeightEngine {
    stats: FeatureStatistics,
    config: WeightConfig,
    cached: Vec<f64>,
    cached_at: Option<u64>,
}

impl FeatureWeightEngine {
    pub fn new(features: usize, map_size: usize, config: WeightConfig) -> Self {
        Self {
            stats: FeatureStatistics::new(features, map_size),
            config,
            cached: Vec::new(),
            cached_at: None,
        }
    }

    pub fn feature_count(&self) -> usize {
        self.stats.feature_active.len()
    }

    pub fn statistics(&self) -> &FeatureStatistics {
        &self.stats
    }

    /// Grows the feature space, e.g. after registering catalog functions.
    pub fn ensure_features(&mut self, features: usize) {
        if features > self.feature_count() {
            self.stats.ensure_features(features);
            self.cached_at = None;
        }
    }

    /// Folds one trial.
    pub fn update(&mut self, active: &[FeatureId], snapshot: &[u8]) {
        let mut indices: Vec<usize> = active.iter().map(|f| f.index()).collect();
        indices.sort_unstable();
        indices.dedup();
        if let Some(max) = indices.last() {
            self.ensure_features(max + 1);
        }
        self.stats.record(&indices, snapshot);
    }

    /// Σ over touched edges of MI(feature, edge) × novelty(edge).
    pub fn weights(&self) -> Vec<f64> {
        let stats = &self.stats;
        (0..self.feature_count())
            .map(|f| {
                let active = stats.feature_active[f];
                let Some(row) = stats.co_active[f].as_ref() else {
                    return 0.0;
                };
                stats
                    .touched
                    .iter()
                    .map(|&e| {
                        mutual_information(
                            u64::from(row[e]),
                            active,
                            stats.edge_active[e],
                            stats.trials,
                        ) * novelty(stats.edge_hits[e])
                    })
                    .sum()
            })
            .collect()
    }

    /// Normalised, sharpened selection probabilities. Uniform until weights
    /// become informative.
    pub fn probabilities(&mut self) -> &[f64] {
        let trials = self.stats.trials;
        let stale = match self.cached_at {
            None => true,
            Some(at) => trials.saturating_sub(at) >= self.config.recompute_every.max(1),
        };
        if stale || self.cached.len() != self.feature_count() {
            self.cached = self.compute_probabilities();
            self.cached_at = Some(trials);
        }
        &self.cached
    }

    fn compute_probabilities(&self) -> Vec<f64> {
        let n = self.feature_count();
        if n == 0 {
            return Vec::new();
        }
        let uniform = || vec![1.0 / n as f64; n];
        if self.stats.trials == 0 {
            return uniform();
        }

        let sharpened: Vec<f64> = self
            .weights()
            .into_iter()
            .map(|w| {
                if w.is_finite() && w > 0.0 {
                    w.powf(self.config.exponent)
                } else {
                    0.0
                }
            })
            .collect();
        let total: f64 = sharpened.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return uniform();
        }
        sharpened.into_iter().map(|w| w / total).collect()
    }

    /// Drops all statistics.
    pub fn recalibrate(&mut self) {
        debug!(trials = self.stats.trials, "recalibrating feature weights");
        self.stats.clear();
        self.cached_at = None;
    }

    /// Bytes held by the dense per-(feature, edge) rows.
    pub fn memory_footprint(&self) -> usize {
        self.stats.allocated_rows() * self.stats.map_size * std::mem::size_of::<u32>()
    }
}
