//! # tlpfuzz-feedback: adaptive generation feedback
//!
//! - [`ExecutionScoreboard`]: per-statement feature usage and outcomes, and
//!   the enable/disable gates derived from them.
//! - [`FeatureWeightEngine`]: mutual information between features and
//!   coverage edges, turned into selection probabilities.
//! - [`select_feature`] / [`FeatureFeedback`]: how generators consume both.

mod error;
mod scoreboard;
mod select;
mod table;
mod weights;

pub use error::{FeedbackError, Result};
pub use scoreboard::{ExecutionRecord, ExecutionScoreboard, FUNCTION_GATE, GateChanges, OutcomeCounter};
pub use select::{FeatureFeedback, FeedbackHandle, Unguided, select_feature};
pub use table::{GatingPolicy, OptionTable, Tally};
pub use weights::{FeatureStatistics, FeatureWeightEngine, WeightConfig, mutual_information, novelty};
