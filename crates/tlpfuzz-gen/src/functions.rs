//! Scalar function catalog and aggregate functions.

use serde::{Deserialize, Serialize};
use tlpfuzz_types::{CompositeKey, FeatureRegistry, GeneratorNode};

use crate::schema::DataType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    pub args: Vec<DataType>,
    pub returns: DataType,
}

impl FunctionSignature {
    pub fn new(name: &str, args: &[DataType], returns: DataType) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            args: args.to_vec(),
            returns,
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// `<NAME>-<slot><TYPE>` key gating one argument slot.
    pub fn slot_key(&self, slot: usize, ty: DataType) -> CompositeKey {
        CompositeKey::new(&self.name, format!("{slot}{}", ty.as_str()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionCatalog {
    functions: Vec<FunctionSignature>,
}

impl FunctionCatalog {
    pub fn new(functions: Vec<FunctionSignature>) -> Self {
        Self { functions }
    }

    /// A small catalog of portable functions.
    pub fn builtin() -> Self {
        use DataType::{Float, Int, Text};
        Self::new(vec![
            FunctionSignature::new("abs", &[Int], Int),
            FunctionSignature::new("round", &[Float], Float),
            FunctionSignature::new("length", &[Text], Int),
            FunctionSignature::new("upper", &[Text], Text),
            FunctionSignature::new("lower", &[Text], Text),
            FunctionSignature::new("greatest", &[Int, Int], Int),
            FunctionSignature::new("least", &[Int, Int], Int),
        ])
    }

    /// Registers every function as a feature.
    pub fn register(&self, registry: &mut FeatureRegistry) {
        for function in &self.functions {
            registry.register_function(&function.name);
        }
    }

    pub fn returning(&self, ty: DataType) -> impl Iterator<Item = &FunctionSignature> {
        self.functions.iter().filter(move |f| f.returns == ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.functions.iter()
    }

    /// `(name, arity)` pairs, the shape the scoreboard derives gates from.
    pub fn arities(&self) -> impl Iterator<Item = (&str, usize)> {
        self.functions.iter().map(|f| (f.name.as_str(), f.arity()))
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    StddevPop,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 6] = [
        AggregateFunction::Count,
        AggregateFunction::Sum,
        AggregateFunction::Avg,
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::StddevPop,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "COUNT",
            AggregateFunction::Sum => "SUM",
            AggregateFunction::Avg => "AVG",
            AggregateFunction::Min => "MIN",
            AggregateFunction::Max => "MAX",
            AggregateFunction::StddevPop => "STDDEV_POP",
        }
    }

    pub const fn node(self) -> GeneratorNode {
        match self {
            AggregateFunction::Count => GeneratorNode::AggCount,
            AggregateFunction::Sum => GeneratorNode::AggSum,
            AggregateFunction::Avg => GeneratorNode::AggAvg,
            AggregateFunction::Min => GeneratorNode::AggMin,
            AggregateFunction::Max => GeneratorNode::AggMax,
            AggregateFunction::StddevPop => GeneratorNode::AggStddevPop,
        }
    }

    pub fn from_node(node: GeneratorNode) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.node() == node)
    }

    /// Whether the argument must be numeric.
    pub const fn needs_numeric(self) -> bool {
        matches!(
            self,
            AggregateFunction::Sum | AggregateFunction::Avg | AggregateFunction::StddevPop
        )
    }
}

/// One aggregate call over a rendered argument expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCall {
    pub function: AggregateFunction,
    pub arg: String,
}

impl AggregateCall {
    pub fn new(function: AggregateFunction, arg: impl Into<String>) -> Self {
        Self {
            function,
            arg: arg.into(),
        }
    }

    pub fn to_sql(&self) -> String {
        format!("{}({})", self.function.name(), self.arg)
    }
}
