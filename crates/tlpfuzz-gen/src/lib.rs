//! # tlpfuzz-gen: random SQL for the partitioning oracles
//!
//! Not a SQL AST: expressions are rendered text, typed just enough to keep
//! most generated statements executable. Choices are steered by a
//! [`tlpfuzz_feedback::FeatureFeedback`] so the feedback loop can weight and
//! gate constructs.

mod functions;
mod generator;
pub mod literal;
mod params;
mod query;
mod schema;
mod setup;

pub use functions::{AggregateCall, AggregateFunction, FunctionCatalog, FunctionSignature};
pub use generator::{Depth, GeneratorOptions, QueryGenerator, Scope};
pub use params::{ConfigParameter, ParameterCatalog, ParameterValues};
pub use query::{Join, JoinKind, SelectQuery};
pub use schema::{ColumnRef, ColumnSchema, DataType, Schema, SchemaProvider, TableSchema};
pub use setup::{DatabaseGenerator, SetupOptions};
