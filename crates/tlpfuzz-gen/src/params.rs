//! Engine configuration parameters changed with `SET` during setup.
//!
//! Each parameter is a runtime feature (`SET_<NAME>`), so the weight engine
//! learns which parameters reach new coverage and selection follows those
//! weights like any other construct.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use tlpfuzz_types::FeatureRegistry;

use crate::literal;

/// The values a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterValues {
    Flag,
    Range(i64, i64),
    /// String settings, quoted when rendered.
    Choice(&'static [&'static str]),
}

impl ParameterValues {
    /// A random value rendered as SQL. `None` for an empty choice list.
    pub fn sample(self, rng: &mut dyn RngCore) -> Option<String> {
        match self {
            ParameterValues::Flag => Some(literal::bool_literal(rng).to_ascii_lowercase()),
            ParameterValues::Range(min, max) => {
                let (low, high) = (min.min(max), min.max(max));
                Some(rng.gen_range(low..=high).to_string())
            }
            ParameterValues::Choice(options) => options.choose(rng).map(|v| literal::quote(v)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigParameter {
    pub name: &'static str,
    pub values: ParameterValues,
}

impl ConfigParameter {
    pub const fn new(name: &'static str, values: ParameterValues) -> Self {
        Self { name, values }
    }

    pub fn set_statement(&self, rng: &mut dyn RngCore) -> Option<String> {
        let value = self.values.sample(rng)?;
        Some(format!("SET {} = {value}", self.name))
    }

    pub fn reset_statement(&self) -> String {
        format!("RESET {}", self.name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterCatalog {
    parameters: Vec<ConfigParameter>,
}

impl ParameterCatalog {
    pub fn new(parameters: Vec<ConfigParameter>) -> Self {
        Self { parameters }
    }

    /// Session-scoped DuckDB settings that change planning or execution
    /// without changing query results.
    pub fn duckdb() -> Self {
        use ParameterValues::{Choice, Flag, Range};
        Self::new(vec![
            ConfigParameter::new("threads", Range(1, 4)),
            ConfigParameter::new("preserve_insertion_order", Flag),
            ConfigParameter::new(
                "default_null_order",
                Choice(&[
                    "nulls_first",
                    "nulls_last",
                    "nulls_first_on_asc_last_on_desc",
                    "nulls_last_on_asc_first_on_desc",
                ]),
            ),
            ConfigParameter::new("default_order", Choice(&["asc", "desc"])),
            ConfigParameter::new("perfect_ht_threshold", Range(0, 32)),
            ConfigParameter::new(
                "disabled_optimizers",
                Choice(&[
                    "filter_pushdown",
                    "join_order",
                    "statistics_propagation",
                    "common_subexpressions",
                    "expression_rewriter",
                    "top_n",
                    "unused_columns",
                ]),
            ),
            ConfigParameter::new("enable_object_cache", Flag),
            ConfigParameter::new("checkpoint_threshold", Choice(&["1MB", "16MB", "1GB"])),
        ])
    }

    /// Registers every parameter as a feature.
    pub fn register(&self, registry: &mut FeatureRegistry) {
        for parameter in &self.parameters {
            registry.register_parameter(parameter.name);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigParameter> {
        self.parameters.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ConfigParameter> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}
