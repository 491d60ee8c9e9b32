//! Generator feature identities.
//!
//! Every construct the statement generator can emit is a feature. The closed
//! set of built-in constructs is [`GeneratorNode`]; catalog functions and
//! engine configuration parameters are registered at runtime and receive
//! ids after the built-ins.

use std::collections::HashMap;
use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Prefix of runtime-registered function feature names (`FN_ABS`).
pub const FUNCTION_PREFIX: &str = "FN_";

/// Prefix of runtime-registered configuration parameter names (`SET_THREADS`).
pub const PARAMETER_PREFIX: &str = "SET_";

/// Separator between the primary and secondary part of a composite key.
const COMPOSITE_SEPARATOR: char = '-';

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFeatureError {
    #[error("unknown generator node: {0}")]
    UnknownNode(String),

    #[error("composite key must be <primary>-<secondary>: {0}")]
    MalformedComposite(String),
}

macro_rules! generator_nodes {
    ($( $variant:ident => $name:literal ),+ $(,)?) => {
        /// A built-in generator construct.
        ///
        /// The textual names are the ones used in deny-list and persisted gate
        /// files, so they must stay stable across releases.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub enum GeneratorNode {
            $( $variant ),+
        }

        impl GeneratorNode {
            /// All nodes in declaration order. The position is the node's [`FeatureId`].
            pub const ALL: &'static [GeneratorNode] = &[ $( GeneratorNode::$variant ),+ ];

            pub const COUNT: usize = Self::ALL.len();

            pub const fn as_str(self) -> &'static str {
                match self {
                    $( GeneratorNode::$variant => $name ),+
                }
            }
        }
    };
}

generator_nodes! {
    // Meta
    UntypeExpr => "UNTYPE_EXPR",

    // Statements
    CreateTable => "CREATE_TABLE",
    CreateIndex => "CREATE_INDEX",
    CreateView => "CREATE_VIEW",
    CreateDatabase => "CREATE_DATABASE",
    Insert => "INSERT",
    Update => "UPDATE",
    Delete => "DELETE",
    Select => "SELECT",
    AlterTable => "ALTER_TABLE",
    Analyze => "ANALYZE",
    Vacuum => "VACUUM",
    Explain => "EXPLAIN",

    // Clauses
    UniqueIndex => "UNIQUE_INDEX",
    UpdateWhere => "UPDATE_WHERE",
    PrimaryKey => "PRIMARY_KEY",
    ColumnNum => "COLUMN_NUM",
    ColumnInt => "COLUMN_INT",
    ColumnBoolean => "COLUMN_BOOLEAN",
    ColumnString => "COLUMN_STRING",
    Join => "JOIN",
    InnerJoin => "INNER_JOIN",
    LeftJoin => "LEFT_JOIN",
    RightJoin => "RIGHT_JOIN",
    FullJoin => "FULL_JOIN",
    CrossJoin => "CROSS_JOIN",
    NaturalJoin => "NATURAL_JOIN",
    LeftNaturalJoin => "LEFT_NATURAL_JOIN",
    RightNaturalJoin => "RIGHT_NATURAL_JOIN",
    FullNaturalJoin => "FULL_NATURAL_JOIN",
    GroupBy => "GROUP_BY",
    Having => "HAVING",
    OrderBy => "ORDER_BY",
    Distinct => "SELECT_DISTINCT",

    // Expressions
    UnaryPostfix => "UNARY_POSTFIX",
    UnaryPrefix => "UNARY_PREFIX",
    BinaryComparison => "BINARY_COMPARISON",
    BinaryLogical => "BINARY_LOGICAL",
    BinaryArithmetic => "BINARY_ARITHMETIC",
    Cast => "CAST",
    Func => "FUNC",
    Between => "BETWEEN",
    Case => "CASE",
    In => "IN",
    Collate => "COLLATE",
    LikeEscape => "LIKE_ESCAPE",
    UntypeFunc => "UNTYPE_FUNC",
    CastFunc => "CAST_FUNC",
    CastColon => "CAST_COLON",
    ColumnRef => "COLUMN_REF",
    Literal => "LITERAL",

    // Postfix operators
    IsNull => "IS_NULL",
    IsNotNull => "IS_NOT_NULL",
    IsTrue => "IS_TRUE",
    IsFalse => "IS_FALSE",
    IsNotUnknown => "IS_NOT_UNKNOWN",

    // Prefix operators
    UNot => "UNOT",
    UPlus => "UPLUS",
    UMinus => "UMINUS",
    USqrtRoot => "USQT_ROOT",
    UAbsVal => "UABS_VAL",
    UBitNot => "UBIT_NOT",
    UCubeRoot => "UCUBE_ROOT",

    // Comparison operators
    Equals => "EQUALS",
    Equals2 => "EQUALS2",
    NotEquals => "NOT_EQUALS",
    NotEquals2 => "NOT_EQUALS2",
    Greater => "GREATER",
    GreaterEquals => "GREATER_EQUALS",
    Smaller => "SMALLER",
    SmallerEquals => "SMALLER_EQUALS",
    Like => "LIKE",
    NotLike => "NOT_LIKE",
    IsDistinct => "DISTINCT",
    IsNotDistinct => "NOT_DISTINCT",
    Is => "IS",
    IsNot => "IS_NOT",

    // Arithmetic operators
    OpAdd => "OPADD",
    OpSub => "OPSUB",
    OpMult => "OPMULT",
    OpDiv => "OPDIV",
    OpMod => "OPMOD",
    OpConcat => "OPCONCAT",
    OpBitAnd => "OPAND",
    OpBitOr => "OPOR",
    OpLshift => "OPLSHIFT",
    OpRshift => "OPRSHIFT",
    OpDivStr => "OPDIV_STR",
    OpModStr => "OPMOD_STR",
    OpBitwiseXor => "OPBITWISE_XOR",

    // Logical operators
    LopAnd => "LOPAND",
    LopOr => "LOPOR",

    // Aggregates
    AggCount => "AGG_COUNT",
    AggSum => "AGG_SUM",
    AggAvg => "AGG_AVG",
    AggMin => "AGG_MIN",
    AggMax => "AGG_MAX",
    AggStddevPop => "AGG_STDDEV_POP",
}

impl Display for GeneratorNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeneratorNode {
    type Err = ParseFeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|node| node.as_str() == s)
            .ok_or_else(|| ParseFeatureError::UnknownNode(s.to_string()))
    }
}

// ============================================================================
// Feature IDs
// ============================================================================

/// Dense identifier of a feature.
///
/// Built-in nodes occupy `0..GeneratorNode::COUNT` in declaration order;
/// registered functions follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeatureId(u32);

impl FeatureId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<GeneratorNode> for FeatureId {
    fn from(node: GeneratorNode) -> Self {
        Self(node as u32)
    }
}

impl Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The name a feature carries in files and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureName {
    Node(GeneratorNode),
    Function(String),
    Parameter(String),
}

impl Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureName::Node(node) => f.write_str(node.as_str()),
            FeatureName::Function(name) => write!(f, "{FUNCTION_PREFIX}{name}"),
            FeatureName::Parameter(name) => write!(f, "{PARAMETER_PREFIX}{name}"),
        }
    }
}

/// Bidirectional name ↔ id table.
///
/// Built once per session; ids handed out are never removed.
#[derive(Debug, Clone)]
pub struct FeatureRegistry {
    names: Vec<FeatureName>,
    by_name: HashMap<String, FeatureId>,
}

impl FeatureRegistry {
    /// Creates a registry holding every [`GeneratorNode`].
    pub fn new() -> Self {
        let mut registry = Self {
            names: Vec::with_capacity(GeneratorNode::COUNT),
            by_name: HashMap::with_capacity(GeneratorNode::COUNT),
        };
        for node in GeneratorNode::ALL {
            registry.push(FeatureName::Node(*node));
        }
        registry
    }

    fn push(&mut self, name: FeatureName) -> FeatureId {
        let id = FeatureId(self.names.len() as u32);
        self.by_name.insert(name.to_string(), id);
        self.names.push(name);
        id
    }

    /// Registers a catalog function. Idempotent; names are case-insensitive.
    pub fn register_function(&mut self, name: &str) -> FeatureId {
        let upper = name.to_ascii_uppercase();
        let key = format!("{FUNCTION_PREFIX}{upper}");
        if let Some(id) = self.by_name.get(&key) {
            return *id;
        }
        self.push(FeatureName::Function(upper))
    }

    /// Registers an engine configuration parameter. Idempotent; names are
    /// case-insensitive.
    pub fn register_parameter(&mut self, name: &str) -> FeatureId {
        let upper = name.to_ascii_uppercase();
        let key = format!("{PARAMETER_PREFIX}{upper}");
        if let Some(id) = self.by_name.get(&key) {
            return *id;
        }
        self.push(FeatureName::Parameter(upper))
    }

    /// Looks up a feature by its file/log name.
    pub fn lookup(&self, name: &str) -> Option<FeatureId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a function feature by its bare catalog name.
    pub fn function(&self, name: &str) -> Option<FeatureId> {
        self.lookup(&format!("{FUNCTION_PREFIX}{}", name.to_ascii_uppercase()))
    }

    pub fn parameter(&self, name: &str) -> Option<FeatureId> {
        self.lookup(&format!("{PARAMETER_PREFIX}{}", name.to_ascii_uppercase()))
    }

    pub fn name(&self, id: FeatureId) -> Option<&FeatureName> {
        self.names.get(id.index())
    }

    /// Display name of `id`, or its numeric form when unknown.
    pub fn display(&self, id: FeatureId) -> String {
        self.name(id).map_or_else(|| id.to_string(), ToString::to_string)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = FeatureId> + '_ {
        (0..self.names.len() as u32).map(FeatureId)
    }
}

impl Default for FeatureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Composite keys
// ============================================================================

/// A feature refined by a secondary attribute, e.g. an operator applied to a
/// datatype or a function argument slot. Text form is `<primary>-<secondary>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn new(primary: impl Display, secondary: impl Display) -> Self {
        Self(format!("{primary}{COMPOSITE_SEPARATOR}{secondary}"))
    }

    /// Parses a key as written in deny-list and gate files.
    pub fn parse(text: &str) -> Result<Self, ParseFeatureError> {
        match text.split_once(COMPOSITE_SEPARATOR) {
            Some((primary, secondary)) if !primary.is_empty() && !secondary.is_empty() => {
                Ok(Self(text.to_string()))
            }
            _ => Err(ParseFeatureError::MalformedComposite(text.to_string())),
        }
    }

    /// True when `text` names a composite key rather than a feature.
    pub fn is_composite(text: &str) -> bool {
        text.contains(COMPOSITE_SEPARATOR)
    }

    pub fn primary(&self) -> &str {
        self.0
            .split_once(COMPOSITE_SEPARATOR)
            .map_or(self.0.as_str(), |(primary, _)| primary)
    }

    pub fn secondary(&self) -> &str {
        self.0
            .split_once(COMPOSITE_SEPARATOR)
            .map_or("", |(_, secondary)| secondary)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_follow_declaration_order() {
        for (index, node) in GeneratorNode::ALL.iter().enumerate() {
            assert_eq!(FeatureId::from(*node).index(), index);
        }
    }

    #[test]
    fn node_names_round_trip() {
        for node in GeneratorNode::ALL {
            assert_eq!(node.as_str().parse::<GeneratorNode>().unwrap(), *node);
        }
        assert!("NOT_A_NODE".parse::<GeneratorNode>().is_err());
    }

    #[test]
    fn node_names_are_unique_and_dash_free() {
        let mut seen = std::collections::HashSet::new();
        for node in GeneratorNode::ALL {
            assert!(seen.insert(node.as_str()), "duplicate name {node}");
            assert!(!CompositeKey::is_composite(node.as_str()));
        }
    }

    #[test]
    fn registry_seeds_nodes_and_appends_functions() {
        let mut registry = FeatureRegistry::new();
        assert_eq!(registry.len(), GeneratorNode::COUNT);
        assert_eq!(
            registry.lookup("BINARY_COMPARISON"),
            Some(FeatureId::from(GeneratorNode::BinaryComparison))
        );

        let abs = registry.register_function("abs");
        assert_eq!(abs.index(), GeneratorNode::COUNT);
        assert_eq!(registry.register_function("ABS"), abs);
        assert_eq!(registry.function("Abs"), Some(abs));
        assert_eq!(registry.display(abs), "FN_ABS");
        assert_eq!(registry.lookup("FN_ABS"), Some(abs));

        let threads = registry.register_parameter("threads");
        assert_eq!(threads.index(), GeneratorNode::COUNT + 1);
        assert_eq!(registry.register_parameter("THREADS"), threads);
        assert_eq!(registry.parameter("threads"), Some(threads));
        assert_eq!(registry.display(threads), "SET_THREADS");
        assert_eq!(registry.function("threads"), None);
    }

    #[test]
    fn operator_names_match_deny_list_spelling() {
        let names = [
            "UNOT",
            "UPLUS",
            "UMINUS",
            "USQT_ROOT",
            "UABS_VAL",
            "UBIT_NOT",
            "UCUBE_ROOT",
            "IS_NOT_UNKNOWN",
            "EQUALS2",
            "NOT_EQUALS2",
            "DISTINCT",
            "NOT_DISTINCT",
            "IS",
            "IS_NOT",
            "OPADD",
            "OPSUB",
            "OPMULT",
            "OPDIV",
            "OPMOD",
            "OPCONCAT",
            "OPAND",
            "OPOR",
            "OPLSHIFT",
            "OPRSHIFT",
            "OPDIV_STR",
            "OPMOD_STR",
            "OPBITWISE_XOR",
            "LOPAND",
            "LOPOR",
            "CREATE_DATABASE",
        ];
        for name in names {
            assert!(name.parse::<GeneratorNode>().is_ok(), "{name}");
        }
        assert_eq!("DISTINCT".parse(), Ok(GeneratorNode::IsDistinct));
        assert_eq!("SELECT_DISTINCT".parse(), Ok(GeneratorNode::Distinct));
        assert!("OP_ADD".parse::<GeneratorNode>().is_err());
    }

    #[test]
    fn composite_key_parts() {
        let key = CompositeKey::new(GeneratorNode::OpAdd, "TEXT");
        assert_eq!(key.as_str(), "OPADD-TEXT");
        assert_eq!(key.primary(), "OPADD");
        assert_eq!(key.secondary(), "TEXT");
        assert_eq!(CompositeKey::parse("OPADD-TEXT").unwrap(), key);
        assert!(CompositeKey::parse("OPADD").is_err());
        assert!(CompositeKey::parse("-TEXT").is_err());
    }
}
