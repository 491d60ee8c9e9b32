//! Random database state: tables, rows, indexes, views and engine
//! parameters.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use tlpfuzz_feedback::FeatureFeedback;
use tlpfuzz_types::{FeatureId, FeatureRegistry, GeneratorNode};

use crate::generator::{Depth, QueryGenerator};
use crate::literal;
use crate::params::ParameterCatalog;
use crate::query::SelectQuery;
use crate::schema::{ColumnSchema, DataType, TableSchema};

/// Chance that a parameter statement restores the default instead.
const RESET_RATIO: f64 = 0.1;

const COLUMN_NODES: &[GeneratorNode] = &[
    GeneratorNode::ColumnInt,
    GeneratorNode::ColumnNum,
    GeneratorNode::ColumnString,
    GeneratorNode::ColumnBoolean,
];

fn column_type(node: GeneratorNode) -> DataType {
    match node {
        GeneratorNode::ColumnNum => DataType::Float,
        GeneratorNode::ColumnString => DataType::Text,
        GeneratorNode::ColumnBoolean => DataType::Boolean,
        _ => DataType::Int,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupOptions {
    pub tables: usize,
    pub max_columns: usize,
    pub max_rows: usize,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            tables: 2,
            max_columns: 3,
            max_rows: 10,
        }
    }
}

/// Generates DDL and DML for a fresh database.
pub struct DatabaseGenerator<'a> {
    options: SetupOptions,
    null_ratio: f64,
    rng: &'a mut dyn RngCore,
    feedback: &'a mut dyn FeatureFeedback,
}

impl<'a> DatabaseGenerator<'a> {
    pub fn new(
        options: SetupOptions,
        null_ratio: f64,
        rng: &'a mut dyn RngCore,
        feedback: &'a mut dyn FeatureFeedback,
    ) -> Self {
        Self {
            options,
            null_ratio,
            rng,
            feedback,
        }
    }

    fn note(&mut self, node: GeneratorNode) {
        self.feedback.record(FeatureId::from(node));
    }

    /// `CREATE TABLE` for table number `index`.
    pub fn create_table(&mut self, index: usize) -> (TableSchema, String) {
        self.note(GeneratorNode::CreateTable);
        let count = self.rng.gen_range(1..=self.options.max_columns.max(1));
        let ids: Vec<FeatureId> = COLUMN_NODES.iter().map(|n| FeatureId::from(*n)).collect();

        let mut columns = Vec::with_capacity(count);
        for i in 0..count {
            let node = self
                .feedback
                .choose(&mut *self.rng, &ids)
                .and_then(|id| GeneratorNode::ALL.get(id.index()).copied())
                .unwrap_or(GeneratorNode::ColumnInt);
            self.feedback.record(FeatureId::from(node));
            columns.push(ColumnSchema {
                name: format!("c{i}"),
                data_type: column_type(node),
            });
        }

        let mut defs: Vec<String> = columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type.sql_name()))
            .collect();
        if self.feedback.allows(FeatureId::from(GeneratorNode::PrimaryKey))
            && self.rng.gen_bool(0.2)
        {
            self.note(GeneratorNode::PrimaryKey);
            defs[0].push_str(" PRIMARY KEY");
        }

        let table = TableSchema {
            name: format!("t{index}"),
            columns,
        };
        let sql = format!("CREATE TABLE {}({})", table.name, defs.join(", "));
        (table, sql)
    }

    /// A multi-row `INSERT` into `table`.
    pub fn insert(&mut self, table: &TableSchema) -> String {
        self.note(GeneratorNode::Insert);
        let rows = self.rng.gen_range(1..=self.options.max_rows.max(1));
        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        let values: Vec<String> = (0..rows)
            .map(|_| {
                let row: Vec<String> = table
                    .columns
                    .iter()
                    .map(|c| literal::literal(&mut *self.rng, c.data_type, self.null_ratio))
                    .collect();
                format!("({})", row.join(", "))
            })
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            table.name,
            names.join(", "),
            values.join(", ")
        )
    }

    /// `CREATE [UNIQUE] INDEX` over one or two columns.
    pub fn create_index(&mut self, table: &TableSchema, index: usize) -> String {
        self.note(GeneratorNode::CreateIndex);
        let unique = self.feedback.allows(FeatureId::from(GeneratorNode::UniqueIndex))
            && self.rng.gen_bool(0.3);
        if unique {
            self.note(GeneratorNode::UniqueIndex);
        }
        let count = self.rng.gen_range(1..=table.columns.len().clamp(1, 2));
        let columns: Vec<&str> = table
            .columns
            .choose_multiple(&mut *self.rng, count)
            .map(|c| c.name.as_str())
            .collect();
        format!(
            "CREATE {}INDEX i{index} ON {}({})",
            if unique { "UNIQUE " } else { "" },
            table.name,
            columns.join(", ")
        )
    }

    pub fn analyze(&mut self) -> String {
        self.note(GeneratorNode::Analyze);
        "ANALYZE".to_string()
    }

    /// `SET <parameter> = <value>` (or `RESET <parameter>`) for a parameter
    /// picked through feedback. `None` when no parameter is registered and
    /// enabled.
    pub fn set_parameter(
        &mut self,
        catalog: &ParameterCatalog,
        registry: &FeatureRegistry,
    ) -> Option<String> {
        let ids: Vec<FeatureId> = catalog
            .iter()
            .filter_map(|p| registry.parameter(p.name))
            .collect();
        let id = self.feedback.choose(&mut *self.rng, &ids)?;
        let parameter = catalog
            .iter()
            .find(|p| registry.parameter(p.name) == Some(id))?;
        self.feedback.record(id);
        if self.rng.gen_bool(RESET_RATIO) {
            return Some(parameter.reset_statement());
        }
        parameter.set_statement(&mut *self.rng)
    }
}

impl QueryGenerator<'_> {
    /// `CREATE VIEW v<index>(c0, ..) AS SELECT ..` over random expressions
    /// of the current schema. `None` when the schema has no tables.
    pub fn create_view(&mut self, index: usize) -> Option<String> {
        let (from, joins, scope) = self.from_context()?;
        self.note(GeneratorNode::CreateView);
        let count = self.rng().gen_range(1..=3);
        let fetch: Vec<String> = (0..count)
            .map(|_| {
                let ty = scope
                    .columns
                    .choose(self.rng())
                    .map_or(DataType::Int, |c| c.data_type);
                self.expr(ty, &scope, Depth::new(1))
            })
            .collect();

        let mut query = SelectQuery::new(fetch, from).with_joins(joins);
        if self.coin(0.5) {
            let predicate = self.predicate(&scope);
            query = query.with_where(predicate);
        }
        if self.allows(GeneratorNode::Distinct) && self.coin(0.2) {
            self.note(GeneratorNode::Distinct);
            query = query.with_distinct(true);
        }
        let names: Vec<String> = (0..count).map(|i| format!("c{i}")).collect();
        Some(format!(
            "CREATE VIEW v{index}({}) AS {}",
            names.join(", "),
            query.to_sql()
        ))
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use tlpfuzz_feedback::{ExecutionScoreboard, FeedbackHandle, Unguided};

    use super::*;
    use crate::functions::FunctionCatalog;
    use crate::generator::GeneratorOptions;
    use crate::schema::Schema;

    #[test]
    fn tables_have_sequential_names_and_typed_columns() {
        let mut rng = SmallRng::seed_from_u64(3);
        let mut feedback = Unguided;
        let mut generator =
            DatabaseGenerator::new(SetupOptions::default(), 0.1, &mut rng, &mut feedback);
        let (table, sql) = generator.create_table(4);
        assert_eq!(table.name, "t4");
        assert!(sql.starts_with("CREATE TABLE t4(c0 "));
        assert!(!table.columns.is_empty() && table.columns.len() <= 3);
    }

    #[test]
    fn insert_lists_every_column() {
        let mut rng = SmallRng::seed_from_u64(8);
        let mut feedback = Unguided;
        let mut generator =
            DatabaseGenerator::new(SetupOptions::default(), 0.0, &mut rng, &mut feedback);
        let table = TableSchema {
            name: "t0".into(),
            columns: vec![
                ColumnSchema {
                    name: "c0".into(),
                    data_type: DataType::Int,
                },
                ColumnSchema {
                    name: "c1".into(),
                    data_type: DataType::Text,
                },
            ],
        };
        let sql = generator.insert(&table);
        assert!(sql.starts_with("INSERT INTO t0 (c0, c1) VALUES ("), "{sql}");
        assert!(!sql.contains("NULL"));
    }

    #[test]
    fn parameter_statements_follow_the_catalog() {
        let catalog = ParameterCatalog::duckdb();
        let mut registry = FeatureRegistry::new();
        catalog.register(&mut registry);
        let mut rng = SmallRng::seed_from_u64(12);
        let mut feedback = Unguided;
        let mut generator =
            DatabaseGenerator::new(SetupOptions::default(), 0.0, &mut rng, &mut feedback);
        for _ in 0..50 {
            let sql = generator.set_parameter(&catalog, &registry).unwrap();
            let name = sql
                .strip_prefix("SET ")
                .and_then(|rest| rest.split_once(" = ").map(|(name, _)| name))
                .or_else(|| sql.strip_prefix("RESET "))
                .unwrap_or_else(|| panic!("unexpected statement {sql}"));
            assert!(catalog.get(name).is_some(), "{sql}");
        }

        // Nothing registered, nothing to choose from.
        let empty = FeatureRegistry::new();
        assert_eq!(generator.set_parameter(&catalog, &empty), None);
    }

    #[test]
    fn disabled_parameters_are_never_set() {
        let catalog = ParameterCatalog::duckdb();
        let mut registry = FeatureRegistry::new();
        catalog.register(&mut registry);
        let mut board = ExecutionScoreboard::new();
        for parameter in catalog.iter().filter(|p| p.name != "threads") {
            board.set_enabled(registry.parameter(parameter.name).unwrap(), false);
        }
        let probabilities = vec![1.0 / registry.len() as f64; registry.len()];
        let mut rng = SmallRng::seed_from_u64(13);
        let mut handle = FeedbackHandle::new(&mut board, &probabilities);
        let mut generator =
            DatabaseGenerator::new(SetupOptions::default(), 0.0, &mut rng, &mut handle);
        for _ in 0..30 {
            let sql = generator.set_parameter(&catalog, &registry).unwrap();
            assert!(sql.contains("threads"), "{sql}");
        }
    }

    #[test]
    fn views_name_their_columns() {
        let schema = Schema {
            tables: vec![TableSchema {
                name: "t0".into(),
                columns: vec![
                    ColumnSchema {
                        name: "c0".into(),
                        data_type: DataType::Int,
                    },
                    ColumnSchema {
                        name: "c1".into(),
                        data_type: DataType::Text,
                    },
                ],
            }],
        };
        let catalog = FunctionCatalog::builtin();
        let mut registry = FeatureRegistry::new();
        catalog.register(&mut registry);
        let mut rng = SmallRng::seed_from_u64(14);
        let mut feedback = Unguided;
        let mut generator = QueryGenerator::new(
            &schema,
            &catalog,
            &registry,
            GeneratorOptions::default(),
            &mut rng,
            &mut feedback,
        );
        for index in 0..20 {
            let sql = generator.create_view(index).unwrap();
            let prefix = format!("CREATE VIEW v{index}(c0");
            assert!(sql.starts_with(&prefix), "{sql}");
            assert!(sql.contains(") AS SELECT "), "{sql}");
            assert!(sql.contains(" FROM t0"), "{sql}");
        }
        let empty = Schema::default();
        let mut rng = SmallRng::seed_from_u64(15);
        let mut feedback = Unguided;
        let mut generator = QueryGenerator::new(
            &empty,
            &catalog,
            &registry,
            GeneratorOptions::default(),
            &mut rng,
            &mut feedback,
        );
        assert_eq!(generator.create_view(0), None);
    }

    #[test]
    fn index_targets_existing_columns() {
        let mut rng = SmallRng::seed_from_u64(5);
        let mut feedback = Unguided;
        let mut generator =
            DatabaseGenerator::new(SetupOptions::default(), 0.0, &mut rng, &mut feedback);
        let (table, _) = generator.create_table(0);
        let sql = generator.create_index(&table, 7);
        assert!(sql.contains("INDEX i7 ON t0("), "{sql}");
    }
}
