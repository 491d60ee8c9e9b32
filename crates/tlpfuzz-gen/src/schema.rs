//! Minimal schema model: tables, typed columns and column references.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Column datatypes the generator knows how to produce values for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int,
    Float,
    Text,
    Boolean,
}

impl DataType {
    pub const ALL: [DataType; 4] = [
        DataType::Int,
        DataType::Float,
        DataType::Text,
        DataType::Boolean,
    ];

    /// Name used as the secondary part of composite keys.
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Int => "INT",
            DataType::Float => "FLOAT",
            DataType::Text => "TEXT",
            DataType::Boolean => "BOOLEAN",
        }
    }

    /// Column type in DDL.
    pub const fn sql_name(self) -> &'static str {
        match self {
            DataType::Int => "INTEGER",
            DataType::Float => "DOUBLE",
            DataType::Text => "VARCHAR",
            DataType::Boolean => "BOOLEAN",
        }
    }

    pub const fn is_numeric(self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Maps an engine-reported type name back to a generator type.
    pub fn from_sql_name(name: &str) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "INTEGER" | "INT" | "INT4" | "BIGINT" | "INT8" | "SMALLINT" | "TINYINT" | "HUGEINT" => {
                Some(DataType::Int)
            }
            "DOUBLE" | "FLOAT" | "REAL" | "FLOAT8" | "FLOAT4" => Some(DataType::Float),
            "VARCHAR" | "TEXT" | "STRING" => Some(DataType::Text),
            "BOOLEAN" | "BOOL" => Some(DataType::Boolean),
            _ if upper.starts_with("DECIMAL") || upper.starts_with("NUMERIC") => {
                Some(DataType::Float)
            }
            _ if upper.starts_with("VARCHAR") => Some(DataType::Text),
            _ => None,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    pub fn column_refs(&self) -> impl Iterator<Item = ColumnRef> + '_ {
        self.columns.iter().map(|c| ColumnRef {
            table: self.name.clone(),
            column: c.name.clone(),
            data_type: c.data_type,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<TableSchema>,
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Source of the current schema, typically the engine's catalog.
pub trait SchemaProvider {
    type Error;

    fn schema(&mut self) -> Result<Schema, Self::Error>;
}

/// A qualified column in scope of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
    pub data_type: DataType,
}

impl Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}
