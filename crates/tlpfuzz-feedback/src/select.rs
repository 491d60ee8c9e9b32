//! Feature selection for generators.

use rand::{Rng, RngCore};
use tlpfuzz_types::{CompositeKey, FeatureId};

use crate::scoreboard::ExecutionScoreboard;

/// Picks one of `candidates` with probability proportional to its weight,
/// skipping features for which `enabled` is false.
///
/// The sample is scaled by the total mass of the enabled candidates and the
/// cumulative sum is walked in candidate order. Falls back to a uniform
/// choice among enabled candidates when they carry no mass. `None` when every
/// candidate is disabled.
pub fn select_feature<R, F>(
    rng: &mut R,
    candidates: &[FeatureId],
    probabilities: &[f64],
    enabled: F,
) -> Option<FeatureId>
where
    R: Rng + ?Sized,
    F: Fn(FeatureId) -> bool,
{
    let weight = |f: FeatureId| {
        probabilities
            .get(f.index())
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
            .unwrap_or(0.0)
    };

    let live: Vec<FeatureId> = candidates.iter().copied().filter(|f| enabled(*f)).collect();
    if live.is_empty() {
        return None;
    }

    let mass: f64 = live.iter().map(|f| weight(*f)).sum();
    if mass > 0.0 && mass.is_finite() {
        let sample = rng.r#gen::<f64>() * mass;
        let mut cumulative = 0.0;
        for feature in &live {
            cumulative += weight(*feature);
            if cumulative > sample {
                return Some(*feature);
            }
        }
    }

    Some(live[rng.gen_range(0..live.len())])
}

/// What a generator needs from the feedback loop.
pub trait FeatureFeedback {
    /// Chooses one enabled candidate, or `None` when all are disabled.
    fn choose(&mut self, rng: &mut dyn RngCore, candidates: &[FeatureId]) -> Option<FeatureId>;

    /// Records that the statement under construction uses `feature`.
    fn record(&mut self, feature: FeatureId);

    fn record_composite(&mut self, key: CompositeKey);

    fn allows(&self, feature: FeatureId) -> bool;

    fn allows_composite(&self, key: &CompositeKey) -> bool;
}

/// Feedback backed by a scoreboard and the current probabilities.
#[derive(Debug)]
pub struct FeedbackHandle<'a> {
    scoreboard: &'a mut ExecutionScoreboard,
    probabilities: &'a [f64],
}

impl<'a> FeedbackHandle<'a> {
    pub fn new(scoreboard: &'a mut ExecutionScoreboard, probabilities: &'a [f64]) -> Self {
        Self {
            scoreboard,
            probabilities,
        }
    }
}

impl FeatureFeedback for FeedbackHandle<'_> {
    fn choose(&mut self, rng: &mut dyn RngCore, candidates: &[FeatureId]) -> Option<FeatureId> {
        let scoreboard = &*self.scoreboard;
        select_feature(rng, candidates, self.probabilities, |f| {
            scoreboard.is_enabled(f)
        })
    }

    fn record(&mut self, feature: FeatureId) {
        self.scoreboard.add_usage(feature);
    }

    fn record_composite(&mut self, key: CompositeKey) {
        self.scoreboard.add_composite_usage(key);
    }

    fn allows(&self, feature: FeatureId) -> bool {
        self.scoreboard.is_enabled(feature)
    }

    fn allows_composite(&self, key: &CompositeKey) -> bool {
        self.scoreboard.composite_enabled(key)
    }
}

/// Uniform choice with nothing recorded. For generating outside a session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unguided;

impl FeatureFeedback for Unguided {
    fn choose(&mut self, rng: &mut dyn RngCore, candidates: &[FeatureId]) -> Option<FeatureId> {
        if candidates.is_empty() {
            None
        } else {
            Some(candidates[rng.gen_range(0..candidates.len())])
        }
    }

    fn record(&mut self, _feature: FeatureId) {}

    fn record_composite(&mut self, _key: CompositeKey) {}

    fn allows(&self, _feature: FeatureId) -> bool {
        true
    }

    fn allows_composite(&self, _key: &CompositeKey) -> bool {
        true
    }
}
