//! Typed random expression and query generation.
//!
//! Every construct choice goes through [`FeatureFeedback`], so the feedback
//! loop both steers the choice (probabilities and gates) and learns which
//! features the finished statement used. Recursion carries an explicit
//! [`Depth`] budget; an exhausted budget always produces a leaf.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use tlpfuzz_feedback::{FUNCTION_GATE, FeatureFeedback};
use tlpfuzz_types::{CompositeKey, FeatureId, FeatureRegistry, GeneratorNode};

use crate::functions::{AggregateCall, AggregateFunction, FunctionCatalog, FunctionSignature};
use crate::literal;
use crate::query::{Join, JoinKind, SelectQuery};
use crate::schema::{ColumnRef, DataType, Schema, TableSchema};

use tlpfuzz_types::GeneratorNode as N;

/// Remaining nesting allowed below the current expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Depth(u32);

impl Depth {
    pub fn new(max: u32) -> Self {
        Self(max)
    }

    pub fn is_exhausted(self) -> bool {
        self.0 == 0
    }

    pub fn descend(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    pub fn remaining(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorOptions {
    pub max_depth: u32,
    pub max_tables: usize,
    /// Allow NATURAL LEFT/RIGHT/FULL joins.
    pub natural_outer_join: bool,
    pub null_ratio: f64,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_tables: 2,
            natural_outer_join: false,
            null_ratio: 0.05,
        }
    }
}

/// Columns visible to the expression under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub columns: Vec<ColumnRef>,
}

impl Scope {
    pub fn new(columns: Vec<ColumnRef>) -> Self {
        Self { columns }
    }

    pub fn of_table(table: &TableSchema) -> Self {
        Self::new(table.column_refs().collect())
    }

    pub fn of_type(&self, ty: DataType) -> Vec<&ColumnRef> {
        self.columns.iter().filter(|c| c.data_type == ty).collect()
    }

    pub fn has(&self, ty: DataType) -> bool {
        self.columns.iter().any(|c| c.data_type == ty)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

const BOOL_NODES: &[GeneratorNode] = &[
    N::BinaryComparison,
    N::BinaryLogical,
    N::UnaryPrefix,
    N::UnaryPostfix,
    N::Between,
    N::In,
    N::Like,
    N::Case,
    N::ColumnRef,
    N::Literal,
];

const NUMERIC_NODES: &[GeneratorNode] = &[
    N::ColumnRef,
    N::Literal,
    N::BinaryArithmetic,
    N::UnaryPrefix,
    N::Func,
    N::Cast,
    N::Case,
];

const TEXT_NODES: &[GeneratorNode] = &[
    N::ColumnRef,
    N::Literal,
    N::BinaryArithmetic,
    N::Func,
    N::Cast,
];

const COMPARISON_OPS: &[GeneratorNode] = &[
    N::Equals,
    N::NotEquals,
    N::Greater,
    N::GreaterEquals,
    N::Smaller,
    N::SmallerEquals,
    N::IsDistinct,
    N::IsNotDistinct,
];

const POSTFIX_OPS: &[GeneratorNode] = &[N::IsNull, N::IsNotNull, N::IsTrue, N::IsFalse];

const NUMERIC_TYPES: [DataType; 2] = [DataType::Int, DataType::Float];

const VALUE_TYPES: [DataType; 3] = [DataType::Int, DataType::Float, DataType::Text];

const AGGREGATES: &[GeneratorNode] = &[
    N::AggCount,
    N::AggSum,
    N::AggAvg,
    N::AggMin,
    N::AggMax,
    N::AggStddevPop,
];

fn comparison_sql(op: GeneratorNode) -> &'static str {
    match op {
        N::NotEquals => "<>",
        N::Greater => ">",
        N::GreaterEquals => ">=",
        N::Smaller => "<",
        N::SmallerEquals => "<=",
        N::IsDistinct => "IS DISTINCT FROM",
        N::IsNotDistinct => "IS NOT DISTINCT FROM",
        _ => "=",
    }
}

fn arithmetic_sql(op: GeneratorNode) -> &'static str {
    match op {
        N::OpSub => "-",
        N::OpMult => "*",
        N::OpDiv => "/",
        N::OpMod => "%",
        N::OpConcat => "||",
        _ => "+",
    }
}

fn arithmetic_ops(ty: DataType) -> &'static [GeneratorNode] {
    match ty {
        DataType::Int => &[N::OpAdd, N::OpSub, N::OpMult, N::OpMod],
        DataType::Float => &[N::OpAdd, N::OpSub, N::OpMult, N::OpDiv],
        DataType::Text => &[N::OpConcat],
        DataType::Boolean => &[],
    }
}

fn postfix_types(op: GeneratorNode) -> &'static [DataType] {
    match op {
        N::IsTrue | N::IsFalse => &[DataType::Boolean],
        _ => &DataType::ALL,
    }
}

fn node_of(id: FeatureId) -> Option<GeneratorNode> {
    GeneratorNode::ALL.get(id.index()).copied()
}

/// Generates queries and expressions over one schema.
pub struct QueryGenerator<'a> {
    schema: &'a Schema,
    catalog: &'a FunctionCatalog,
    registry: &'a FeatureRegistry,
    options: GeneratorOptions,
    rng: &'a mut dyn RngCore,
    feedback: &'a mut dyn FeatureFeedback,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(
        schema: &'a Schema,
        catalog: &'a FunctionCatalog,
        registry: &'a FeatureRegistry,
        options: GeneratorOptions,
        rng: &'a mut dyn RngCore,
        feedback: &'a mut dyn FeatureFeedback,
    ) -> Self {
        Self {
            schema,
            catalog,
            registry,
            options,
            rng,
            feedback,
        }
    }

    pub fn schema(&self) -> &Schema {
        self.schema
    }

    pub fn options(&self) -> GeneratorOptions {
        self.options
    }

    /// Randomness for oracle-level decisions.
    pub fn rng(&mut self) -> &mut dyn RngCore {
        &mut *self.rng
    }

    /// Records a clause-level feature chosen outside the generator.
    pub fn note(&mut self, node: GeneratorNode) {
        self.feedback.record(FeatureId::from(node));
    }

    pub fn allows(&self, node: GeneratorNode) -> bool {
        self.feedback.allows(FeatureId::from(node))
    }

    pub fn coin(&mut self, p: f64) -> bool {
        self.rng.gen_bool(p.clamp(0.0, 1.0))
    }

    /// Lets feedback pick one of `candidates` and records it.
    fn choose(&mut self, candidates: &[GeneratorNode]) -> Option<GeneratorNode> {
        let ids: Vec<FeatureId> = candidates.iter().map(|n| FeatureId::from(*n)).collect();
        let id = self.feedback.choose(&mut *self.rng, &ids)?;
        self.feedback.record(id);
        node_of(id)
    }

    fn composite_allowed(&self, primary: GeneratorNode, ty: DataType) -> bool {
        self.feedback
            .allows_composite(&CompositeKey::new(primary, ty))
    }

    fn any_composite(&self, primary: GeneratorNode, types: &[DataType]) -> bool {
        types.iter().any(|t| self.composite_allowed(primary, *t))
    }

    fn any_op(&self, ops: &[GeneratorNode], ty: DataType) -> bool {
        ops.iter().any(|op| self.composite_allowed(*op, ty))
    }

    fn record_composite(&mut self, primary: GeneratorNode, ty: DataType) {
        self.feedback.record_composite(CompositeKey::new(primary, ty));
    }

    /// Picks one of `ops` whose composite with `ty` is enabled and records
    /// both. `None` when every pairing is disabled.
    fn gated_op(&mut self, ops: &[GeneratorNode], ty: DataType) -> Option<GeneratorNode> {
        let allowed: Vec<GeneratorNode> = ops
            .iter()
            .copied()
            .filter(|op| self.composite_allowed(*op, ty))
            .collect();
        let op = self.choose(&allowed).or_else(|| allowed.first().copied())?;
        self.record_composite(op, ty);
        Some(op)
    }

    /// A type from `pool` accepted by `admits`, usually one present in
    /// scope.
    fn gated_type(
        &mut self,
        scope: &Scope,
        pool: &[DataType],
        admits: impl Fn(&Self, DataType) -> bool,
    ) -> Option<DataType> {
        let (present, open) = {
            let this: &Self = self;
            let present: Vec<DataType> = scope
                .columns
                .iter()
                .map(|c| c.data_type)
                .filter(|t| pool.contains(t) && admits(this, *t))
                .collect();
            let open: Vec<DataType> = pool.iter().copied().filter(|t| admits(this, *t)).collect();
            (present, open)
        };
        if !present.is_empty() && self.coin(0.8) {
            return Some(present[self.rng.gen_range(0..present.len())]);
        }
        open.choose(&mut *self.rng).copied()
    }

    /// Picks an operand type for `primary` among the enabled composites and
    /// records it.
    fn typed(&mut self, primary: GeneratorNode, pool: &[DataType], scope: &Scope) -> Option<DataType> {
        let ty = self.gated_type(scope, pool, |g, t| g.composite_allowed(primary, t))?;
        self.record_composite(primary, ty);
        Some(ty)
    }

    fn pick_column(&mut self, scope: &Scope, ty: DataType) -> Option<String> {
        let columns = scope.of_type(ty);
        columns.choose(&mut *self.rng).map(ToString::to_string)
    }

    fn literal(&mut self, ty: DataType) -> String {
        self.feedback.record(FeatureId::from(N::Literal));
        literal::literal(&mut *self.rng, ty, self.options.null_ratio)
    }

    /// A non-boolean type, usually one present in scope.
    fn scope_type(&mut self, scope: &Scope) -> DataType {
        self.gated_type(scope, &VALUE_TYPES, |_, _| true)
            .unwrap_or(DataType::Int)
    }

    // ------------------------------------------------------------------
    // FROM context
    // ------------------------------------------------------------------

    /// A base query over a random FROM/JOIN context, fetching some of the
    /// columns in scope. `None` when the schema has no tables.
    pub fn base_query(&mut self) -> Option<(SelectQuery, Scope)> {
        let (from, joins, scope) = self.from_context()?;
        let fetch = self.fetch_columns(&scope);
        self.note(N::Select);
        Some((SelectQuery::new(fetch, from).with_joins(joins), scope))
    }

    pub fn from_context(&mut self) -> Option<(Vec<String>, Vec<Join>, Scope)> {
        if self.schema.is_empty() {
            return None;
        }
        let max = self.options.max_tables.clamp(1, self.schema.tables.len());
        let count = self.rng.gen_range(1..=max);
        let schema = self.schema;
        let tables: Vec<&TableSchema> = schema
            .tables
            .choose_multiple(&mut *self.rng, count)
            .collect();

        let mut scope = Scope::of_table(tables[0]);
        let mut from = vec![tables[0].name.clone()];
        let mut joins = Vec::new();
        for table in &tables[1..] {
            let table_scope = Scope::of_table(table);
            match self.join_kind() {
                Some(kind) => {
                    let mut joined = scope.clone();
                    joined.columns.extend(table_scope.columns.iter().cloned());
                    let on = kind
                        .takes_condition()
                        .then(|| self.predicate(&joined));
                    joins.push(Join {
                        kind,
                        table: table.name.clone(),
                        on,
                    });
                }
                None => from.push(table.name.clone()),
            }
            scope.columns.extend(table_scope.columns);
        }
        Some((from, joins, scope))
    }

    fn join_kind(&mut self) -> Option<JoinKind> {
        if !self.allows(N::Join) || !self.coin(0.5) {
            return None;
        }
        let kinds: Vec<JoinKind> = JoinKind::ALL
            .into_iter()
            .filter(|k| self.options.natural_outer_join || !k.is_natural_outer())
            .collect();
        let nodes: Vec<GeneratorNode> = kinds.iter().map(|k| k.node()).collect();
        let node = self.choose(&nodes)?;
        self.note(N::Join);
        kinds.into_iter().find(|k| k.node() == node)
    }

    pub fn fetch_columns(&mut self, scope: &Scope) -> Vec<String> {
        if scope.is_empty() {
            return vec!["1".to_string()];
        }
        let count = self.rng.gen_range(1..=scope.columns.len().min(3));
        scope
            .columns
            .choose_multiple(&mut *self.rng, count)
            .map(ToString::to_string)
            .collect()
    }

    // ------------------------------------------------------------------
    // Boolean expressions
    // ------------------------------------------------------------------

    /// A random boolean predicate over `scope`.
    pub fn predicate(&mut self, scope: &Scope) -> String {
        let depth = Depth::new(self.options.max_depth);
        self.boolean(scope, depth)
    }

    pub fn boolean(&mut self, scope: &Scope, depth: Depth) -> String {
        if depth.is_exhausted() {
            return self.boolean_leaf(scope);
        }
        let candidates: Vec<GeneratorNode> = BOOL_NODES
            .iter()
            .copied()
            .filter(|n| self.boolean_viable(*n))
            .collect();
        let Some(node) = self.choose(&candidates) else {
            return self.boolean_leaf(scope);
        };
        let next = depth.descend();
        match node {
            N::BinaryComparison => self.comparison(scope, next),
            N::BinaryLogical => {
                let op = self.choose(&[N::LopAnd, N::LopOr]).unwrap_or(N::LopAnd);
                let keyword = if op == N::LopOr { "OR" } else { "AND" };
                let left = self.boolean(scope, next);
                let right = self.boolean(scope, next);
                format!("({left}) {keyword} ({right})")
            }
            N::UnaryPrefix => {
                self.note(N::UNot);
                format!("NOT ({})", self.boolean(scope, next))
            }
            N::UnaryPostfix => self.postfix(scope, next),
            N::Between => {
                let Some(ty) = self.typed(N::Between, &NUMERIC_TYPES, scope) else {
                    return self.boolean_leaf(scope);
                };
                let value = self.expr(ty, scope, next);
                let low = self.expr(ty, scope, next);
                let high = self.expr(ty, scope, next);
                format!("({value}) BETWEEN ({low}) AND ({high})")
            }
            N::In => {
                let Some(ty) = self.typed(N::In, &VALUE_TYPES, scope) else {
                    return self.boolean_leaf(scope);
                };
                let value = self.expr(ty, scope, next);
                let n = self.rng.gen_range(1..=3);
                let list: Vec<String> = (0..n).map(|_| self.expr(ty, scope, next)).collect();
                format!("({value}) IN ({})", list.join(", "))
            }
            N::Like => {
                let op = self.choose(&[N::Like, N::NotLike]).unwrap_or(N::Like);
                let keyword = if op == N::NotLike { "NOT LIKE" } else { "LIKE" };
                let value = self.expr(DataType::Text, scope, next);
                let pattern = literal::like_pattern(&mut *self.rng);
                format!("({value}) {keyword} {pattern}")
            }
            N::Case => self.case(DataType::Boolean, scope, next),
            N::ColumnRef => self
                .pick_column(scope, DataType::Boolean)
                .unwrap_or_else(|| self.boolean_leaf(scope)),
            _ => self.literal(DataType::Boolean),
        }
    }

    /// Whether `node` can be built under the current composite gates.
    fn boolean_viable(&self, node: GeneratorNode) -> bool {
        match node {
            N::BinaryComparison => DataType::ALL.iter().any(|t| self.any_op(COMPARISON_OPS, *t)),
            N::UnaryPostfix => POSTFIX_OPS
                .iter()
                .any(|op| self.any_composite(*op, postfix_types(*op))),
            N::Between => self.any_composite(N::Between, &NUMERIC_TYPES),
            N::In => self.any_composite(N::In, &VALUE_TYPES),
            N::Case => self.composite_allowed(N::Case, DataType::Boolean),
            _ => true,
        }
    }

    fn boolean_leaf(&mut self, scope: &Scope) -> String {
        if !scope.is_empty() && self.coin(0.7) {
            let column = scope.columns[self.rng.gen_range(0..scope.columns.len())].clone();
            if column.data_type == DataType::Boolean {
                self.note(N::ColumnRef);
                return column.to_string();
            }
            if let Some(op) = self.comparison_op(column.data_type) {
                self.note(N::BinaryComparison);
                self.note(N::ColumnRef);
                let value = self.literal(column.data_type);
                return format!("({column}) {} ({value})", comparison_sql(op));
            }
        }
        self.literal(DataType::Boolean)
    }

    fn comparison_op(&mut self, ty: DataType) -> Option<GeneratorNode> {
        self.gated_op(COMPARISON_OPS, ty)
    }

    fn comparison(&mut self, scope: &Scope, depth: Depth) -> String {
        let ty = self
            .gated_type(scope, &DataType::ALL, |g, t| g.any_op(COMPARISON_OPS, t))
            .unwrap_or(DataType::Boolean);
        let Some(op) = self.comparison_op(ty) else {
            return self.boolean_leaf(scope);
        };
        let left = self.expr(ty, scope, depth);
        let right = self.expr(ty, scope, depth);
        format!("({left}) {} ({right})", comparison_sql(op))
    }

    fn postfix(&mut self, scope: &Scope, depth: Depth) -> String {
        let ops: Vec<GeneratorNode> = POSTFIX_OPS
            .iter()
            .copied()
            .filter(|op| self.any_composite(*op, postfix_types(*op)))
            .collect();
        let Some(op) = self.choose(&ops).or_else(|| ops.first().copied()) else {
            return self.boolean_leaf(scope);
        };
        let Some(ty) = self.typed(op, postfix_types(op), scope) else {
            return self.boolean_leaf(scope);
        };
        let suffix = match op {
            N::IsTrue => "IS TRUE",
            N::IsFalse => "IS FALSE",
            N::IsNotNull => "IS NOT NULL",
            _ => "IS NULL",
        };
        format!("({}) {suffix}", self.expr(ty, scope, depth))
    }

    /// Callers check the `CASE-<type>` gate first.
    fn case(&mut self, ty: DataType, scope: &Scope, depth: Depth) -> String {
        self.record_composite(N::Case, ty);
        let condition = self.boolean(scope, depth);
        let then = self.expr(ty, scope, depth);
        let otherwise = self.expr(ty, scope, depth);
        format!("CASE WHEN {condition} THEN {then} ELSE {otherwise} END")
    }

    // ------------------------------------------------------------------
    // Typed value expressions
    // ------------------------------------------------------------------

    /// An expression of type `ty`.
    pub fn expr(&mut self, ty: DataType, scope: &Scope, depth: Depth) -> String {
        match ty {
            DataType::Boolean => self.boolean(scope, depth),
            DataType::Int | DataType::Float => self.numeric(ty, scope, depth),
            DataType::Text => self.text(scope, depth),
        }
    }

    fn value_leaf(&mut self, ty: DataType, scope: &Scope) -> String {
        if self.coin(0.6) {
            if let Some(column) = self.pick_column(scope, ty) {
                self.note(N::ColumnRef);
                return column;
            }
        }
        self.literal(ty)
    }

    /// Whether a value-producing `node` of type `ty` can be built under the
    /// current composite gates.
    fn value_viable(&self, node: GeneratorNode, ty: DataType) -> bool {
        match node {
            N::BinaryArithmetic => self.any_op(arithmetic_ops(ty), ty),
            N::Func => !self.callable(ty).is_empty(),
            N::Cast | N::Case => self.composite_allowed(node, ty),
            _ => true,
        }
    }

    fn value_nodes(&self, nodes: &[GeneratorNode], ty: DataType) -> Vec<GeneratorNode> {
        nodes
            .iter()
            .copied()
            .filter(|n| self.value_viable(*n, ty))
            .collect()
    }

    fn numeric(&mut self, ty: DataType, scope: &Scope, depth: Depth) -> String {
        if depth.is_exhausted() {
            return self.value_leaf(ty, scope);
        }
        let candidates = self.value_nodes(NUMERIC_NODES, ty);
        let Some(node) = self.choose(&candidates) else {
            return self.value_leaf(ty, scope);
        };
        let next = depth.descend();
        match node {
            N::BinaryArithmetic => {
                let Some(op) = self.gated_op(arithmetic_ops(ty), ty) else {
                    return self.value_leaf(ty, scope);
                };
                let left = self.numeric(ty, scope, next);
                let right = self.numeric(ty, scope, next);
                format!("({left}) {} ({right})", arithmetic_sql(op))
            }
            N::UnaryPrefix => {
                let op = self.choose(&[N::UMinus, N::UPlus]).unwrap_or(N::UMinus);
                let sign = if op == N::UPlus { '+' } else { '-' };
                format!("{sign}({})", self.numeric(ty, scope, next))
            }
            N::Func => self
                .function_call(ty, scope, next)
                .unwrap_or_else(|| self.value_leaf(ty, scope)),
            N::Cast => {
                self.record_composite(N::Cast, ty);
                let (source, target) = match ty {
                    DataType::Int => (DataType::Float, "INTEGER"),
                    _ => (DataType::Int, "DOUBLE"),
                };
                format!("CAST(({}) AS {target})", self.numeric(source, scope, next))
            }
            N::Case => self.case(ty, scope, next),
            N::ColumnRef => self.pick_column(scope, ty).unwrap_or_else(|| self.literal(ty)),
            _ => self.literal(ty),
        }
    }

    fn text(&mut self, scope: &Scope, depth: Depth) -> String {
        if depth.is_exhausted() {
            return self.value_leaf(DataType::Text, scope);
        }
        let candidates = self.value_nodes(TEXT_NODES, DataType::Text);
        let Some(node) = self.choose(&candidates) else {
            return self.value_leaf(DataType::Text, scope);
        };
        let next = depth.descend();
        match node {
            N::BinaryArithmetic => {
                self.note(N::OpConcat);
                self.record_composite(N::OpConcat, DataType::Text);
                let left = self.text(scope, next);
                let right = self.text(scope, next);
                format!("({left}) || ({right})")
            }
            N::Func => self
                .function_call(DataType::Text, scope, next)
                .unwrap_or_else(|| self.value_leaf(DataType::Text, scope)),
            N::Cast => {
                self.record_composite(N::Cast, DataType::Text);
                format!("CAST(({}) AS VARCHAR)", self.numeric(DataType::Int, scope, next))
            }
            N::ColumnRef => self
                .pick_column(scope, DataType::Text)
                .unwrap_or_else(|| self.literal(DataType::Text)),
            _ => self.literal(DataType::Text),
        }
    }

    /// Functions returning `ty` whose name gate and every argument slot gate
    /// are enabled.
    fn callable(&self, ty: DataType) -> Vec<&'a FunctionSignature> {
        let catalog: &'a FunctionCatalog = self.catalog;
        catalog
            .returning(ty)
            .filter(|f| {
                self.feedback
                    .allows_composite(&CompositeKey::new(FUNCTION_GATE, &f.name))
                    && f.args.iter().enumerate().all(|(slot, arg_ty)| {
                        self.feedback.allows_composite(&f.slot_key(slot, *arg_ty))
                    })
            })
            .collect()
    }

    fn function_call(&mut self, ty: DataType, scope: &Scope, depth: Depth) -> Option<String> {
        let registry = self.registry;
        let candidates = self.callable(ty);
        let ids: Vec<FeatureId> = candidates
            .iter()
            .filter_map(|f| registry.function(&f.name))
            .collect();
        let id = self.feedback.choose(&mut *self.rng, &ids)?;
        let function = candidates
            .into_iter()
            .find(|f| registry.function(&f.name) == Some(id))?
            .clone();
        self.feedback.record(id);

        let mut args = Vec::with_capacity(function.arity());
        for (slot, arg_ty) in function.args.iter().enumerate() {
            self.feedback.record_composite(function.slot_key(slot, *arg_ty));
            args.push(self.expr(*arg_ty, scope, depth));
        }
        Some(format!("{}({})", function.name, args.join(", ")))
    }

    // ------------------------------------------------------------------
    // Aggregates, HAVING and ORDER BY
    // ------------------------------------------------------------------

    /// An aggregate call over a numeric argument.
    pub fn numeric_aggregate(&mut self, scope: &Scope) -> AggregateCall {
        let node = self.choose(AGGREGATES).unwrap_or(N::AggCount);
        let function = AggregateFunction::from_node(node).unwrap_or(AggregateFunction::Count);
        let ty = if scope.has(DataType::Float) && self.coin(0.5) {
            DataType::Float
        } else {
            DataType::Int
        };
        let arg = self.numeric(ty, scope, Depth::new(1));
        AggregateCall::new(function, arg)
    }

    /// An aggregate call over any column type where the aggregate allows it.
    pub fn aggregate(&mut self, scope: &Scope) -> AggregateCall {
        let node = self.choose(AGGREGATES).unwrap_or(N::AggCount);
        let function = AggregateFunction::from_node(node).unwrap_or(AggregateFunction::Count);
        let ty = if function.needs_numeric() {
            if scope.has(DataType::Float) && self.coin(0.5) {
                DataType::Float
            } else {
                DataType::Int
            }
        } else {
            self.scope_type(scope)
        };
        let arg = self.expr(ty, scope, Depth::new(1));
        AggregateCall::new(function, arg)
    }

    /// A predicate eligible for HAVING: comparisons of aggregates against
    /// literals, optionally combined.
    pub fn having_predicate(&mut self, scope: &Scope) -> String {
        let depth = Depth::new(self.options.max_depth.min(2));
        self.having(scope, depth)
    }

    fn having(&mut self, scope: &Scope, depth: Depth) -> String {
        if !depth.is_exhausted() && self.coin(0.3) {
            self.note(N::BinaryLogical);
            let op = self.choose(&[N::LopAnd, N::LopOr]).unwrap_or(N::LopAnd);
            let keyword = if op == N::LopOr { "OR" } else { "AND" };
            let left = self.having(scope, depth.descend());
            let right = self.having(scope, depth.descend());
            return format!("({left}) {keyword} ({right})");
        }
        let call = self.numeric_aggregate(scope);
        let Some(op) = self
            .comparison_op(DataType::Float)
            .or_else(|| self.comparison_op(DataType::Int))
        else {
            return self.literal(DataType::Boolean);
        };
        self.note(N::BinaryComparison);
        let value = self.literal(DataType::Int);
        format!("({}) {} ({value})", call.to_sql(), comparison_sql(op))
    }

    pub fn order_by(&mut self, scope: &Scope) -> Vec<String> {
        if scope.is_empty() {
            return Vec::new();
        }
        self.note(N::OrderBy);
        let count = self.rng.gen_range(1..=scope.columns.len().min(2));
        let columns: Vec<String> = scope
            .columns
            .choose_multiple(&mut *self.rng, count)
            .map(ToString::to_string)
            .collect();
        columns
            .into_iter()
            .map(|c| match self.rng.gen_range(0..3) {
                0 => format!("{c} ASC"),
                1 => format!("{c} DESC"),
                _ => c,
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Data-changing statements
    // ------------------------------------------------------------------

    pub fn update_statement(&mut self, table: &TableSchema) -> Option<String> {
        let column = table.columns.choose(&mut *self.rng)?.clone();
        self.note(N::Update);
        let scope = Scope::of_table(table);
        let value = self.expr(column.data_type, &scope, Depth::new(1));
        let mut sql = format!("UPDATE {} SET {} = {value}", table.name, column.name);
        if self.coin(0.7) {
            self.note(N::UpdateWhere);
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate(&scope));
        }
        Some(sql)
    }

    pub fn delete_statement(&mut self, table: &TableSchema) -> String {
        self.note(N::Delete);
        let scope = Scope::of_table(table);
        format!("DELETE FROM {} WHERE {}", table.name, self.predicate(&scope))
    }
}
