//! # tlpfuzz-types: Core types for `tlpfuzz`
//!
//! This crate contains the shared vocabulary of the tester:
//! - Generator features ([`GeneratorNode`], [`FeatureId`], [`FeatureName`], [`FeatureRegistry`])
//! - Composite option keys ([`CompositeKey`])
//! - Result values ([`Value`], [`Row`], [`ResultSet`])

mod feature;
mod value;

pub use feature::{
    CompositeKey, FeatureId, FeatureName, FeatureRegistry, GeneratorNode, ParseFeatureError,
    FUNCTION_PREFIX, PARAMETER_PREFIX,
};
pub use value::{ResultSet, Row, Value};
