//! In-process DuckDB statement executor.
//!
//! When a statement budget is configured, a watchdog thread interrupts the
//! connection once the budget runs out. The interrupted statement (or one
//! that merely finished late) is reported as [`ExecutionError::Timeout`].

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use duckdb::{Connection, InterruptHandle};
use duckdb::types::ValueRef;
use tlpfuzz_gen::{ColumnSchema, DataType, Schema, SchemaProvider, TableSchema};
use tlpfuzz_types::{ResultSet, Value};
use tracing::{debug, warn};

use crate::StatementExecutor;
use crate::error::ExecutionError;

/// Statements that produce a result set.
const QUERY_PREFIXES: &[&str] = &[
    "SELECT", "WITH", "VALUES", "EXPLAIN", "PRAGMA", "DESCRIBE", "SHOW", "FROM", "(",
];

/// Interrupts one statement when its budget elapses, unless disarmed first.
struct Watchdog {
    disarm: mpsc::Sender<()>,
    fired: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    fn arm(handle: Arc<InterruptHandle>, budget: Duration) -> Self {
        let (disarm, disarmed) = mpsc::channel::<()>();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let thread = thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = disarmed.recv_timeout(budget) {
                flag.store(true, Ordering::SeqCst);
                handle.interrupt();
            }
        });
        Self {
            disarm,
            fired,
            thread: Some(thread),
        }
    }

    /// Stops the watchdog and reports whether it interrupted the statement.
    fn disarm(mut self) -> bool {
        // The receiver is gone once the watchdog fired.
        let _ = self.disarm.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("statement watchdog panicked");
            }
        }
        self.fired.load(Ordering::SeqCst)
    }
}

pub struct DuckDbExecutor {
    conn: Connection,
    statement_timeout: Option<Duration>,
}

impl DuckDbExecutor {
    /// Opens an in-memory database.
    pub fn new() -> Result<Self, ExecutionError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ExecutionError::Internal(format!("failed to open DuckDB: {e}")))?;
        Ok(Self {
            conn,
            statement_timeout: None,
        })
    }

    /// Opens (or creates) a database file.
    pub fn open(path: &Path) -> Result<Self, ExecutionError> {
        let conn = Connection::open(path).map_err(|e| {
            ExecutionError::Internal(format!("failed to open {}: {e}", path.display()))
        })?;
        Ok(Self {
            conn,
            statement_timeout: None,
        })
    }

    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    fn classify(err: &duckdb::Error) -> ExecutionError {
        let message = err.to_string();
        if message.contains("Parser Error") {
            ExecutionError::Syntax(message)
        } else if message.contains("Binder Error") || message.contains("Catalog Error") {
            ExecutionError::Semantic(message)
        } else if message.contains("Not implemented") {
            ExecutionError::Unsupported(message)
        } else {
            ExecutionError::Runtime(message)
        }
    }

    /// Converts a DuckDB value to a tlpfuzz [`Value`].
    fn convert_value(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Boolean(b) => Value::Boolean(b),
            ValueRef::TinyInt(i) => Value::Integer(i64::from(i)),
            ValueRef::SmallInt(i) => Value::Integer(i64::from(i)),
            ValueRef::Int(i) => Value::Integer(i64::from(i)),
            ValueRef::BigInt(i) => Value::Integer(i),
            ValueRef::HugeInt(i) => i64::try_from(i).map_or(Value::Real(i as f64), Value::Integer),
            ValueRef::UTinyInt(i) => Value::Integer(i64::from(i)),
            ValueRef::USmallInt(i) => Value::Integer(i64::from(i)),
            ValueRef::UInt(i) => Value::Integer(i64::from(i)),
            ValueRef::UBigInt(i) => i64::try_from(i).map_or(Value::Real(i as f64), Value::Integer),
            ValueRef::Float(f) => Value::Real(f64::from(f)),
            ValueRef::Double(f) => Value::Real(f),
            ValueRef::Decimal(d) => {
                let text = d.to_string();
                text.parse::<f64>().map_or(Value::Text(text), Value::Real)
            }
            ValueRef::Timestamp(unit, v) => Value::Timestamp(unit.to_micros(v)),
            ValueRef::Text(s) => Value::Text(String::from_utf8_lossy(s).into_owned()),
            ValueRef::Blob(b) => Value::Bytes(Bytes::copy_from_slice(b)),
            ValueRef::Date32(d) => Value::Date(d),
            ValueRef::Time64(unit, t) => Value::Time(unit.to_micros(t)),
            // Intervals, lists, structs and maps never come out of generated queries.
            _ => Value::Null,
        }
    }

    fn is_query(sql: &str) -> bool {
        let upper = sql.trim_start().to_ascii_uppercase();
        QUERY_PREFIXES.iter().any(|p| upper.starts_with(p))
    }

    fn run(&mut self, sql: &str) -> Result<ResultSet, ExecutionError> {
        if !Self::is_query(sql) {
            self.conn.execute(sql, []).map_err(|e| Self::classify(&e))?;
            return Ok(ResultSet::empty());
        }

        let mut stmt = self.conn.prepare(sql).map_err(|e| Self::classify(&e))?;
        let mut rows = stmt.query([]).map_err(|e| Self::classify(&e))?;

        let mut result = ResultSet::empty();
        while let Some(row) = rows.next().map_err(|e| Self::classify(&e))? {
            let column_count = row.as_ref().column_count();
            if result.columns.is_empty() {
                for i in 0..column_count {
                    let name = row.as_ref().column_name(i).map_err(|e| {
                        ExecutionError::Internal(format!("failed to get column name: {e}"))
                    })?;
                    result.columns.push(name.to_string());
                }
            }
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value = row.get_ref(i).map_err(|e| Self::classify(&e))?;
                values.push(Self::convert_value(value));
            }
            result.rows.push(values);
        }
        Ok(result)
    }

    fn names(&mut self, sql: &str) -> Result<Vec<(String, String)>, ExecutionError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| ExecutionError::Internal(format!("catalog query failed: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| ExecutionError::Internal(format!("catalog query failed: {e}")))?;
        let mut out = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| ExecutionError::Internal(format!("catalog row failed: {e}")))?
        {
            let a: String = row
                .get(0)
                .map_err(|e| ExecutionError::Internal(format!("catalog column failed: {e}")))?;
            let b: String = row
                .get(1)
                .map_err(|e| ExecutionError::Internal(format!("catalog column failed: {e}")))?;
            out.push((a, b));
        }
        Ok(out)
    }
}

impl StatementExecutor for DuckDbExecutor {
    fn execute(&mut self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let Some(budget) = self.statement_timeout else {
            return self.run(sql);
        };
        let watchdog = Watchdog::arm(self.conn.interrupt_handle(), budget);
        let started = Instant::now();
        let result = self.run(sql);
        let elapsed = started.elapsed();
        let interrupted = watchdog.disarm();
        if interrupted || elapsed > budget {
            debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                interrupted,
                sql,
                "statement over budget"
            );
            return Err(ExecutionError::Timeout(budget.as_millis() as u64));
        }
        result
    }

    fn reset(&mut self) -> Result<(), ExecutionError> {
        let objects = self.names(
            "SELECT table_name, table_type FROM information_schema.tables \
             WHERE table_schema = 'main' ORDER BY table_type DESC",
        )?;
        // Views sort before base tables so dependents go first.
        for (name, kind) in objects {
            let keyword = if kind == "VIEW" { "VIEW" } else { "TABLE" };
            let drop = format!("DROP {keyword} IF EXISTS {name}");
            self.conn.execute(&drop, []).map_err(|e| {
                ExecutionError::Internal(format!("failed to drop {name}: {e}"))
            })?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DuckDB"
    }
}

impl SchemaProvider for DuckDbExecutor {
    type Error = ExecutionError;

    fn schema(&mut self) -> Result<Schema, ExecutionError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT table_name, column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = 'main' ORDER BY table_name, ordinal_position",
            )
            .map_err(|e| ExecutionError::Internal(format!("catalog query failed: {e}")))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| ExecutionError::Internal(format!("catalog query failed: {e}")))?;

        let mut schema = Schema::default();
        while let Some(row) = rows
            .next()
            .map_err(|e| ExecutionError::Internal(format!("catalog row failed: {e}")))?
        {
            let table: String = row
                .get(0)
                .map_err(|e| ExecutionError::Internal(format!("catalog column failed: {e}")))?;
            let column: String = row
                .get(1)
                .map_err(|e| ExecutionError::Internal(format!("catalog column failed: {e}")))?;
            let type_name: String = row
                .get(2)
                .map_err(|e| ExecutionError::Internal(format!("catalog column failed: {e}")))?;

            let Some(data_type) = DataType::from_sql_name(&type_name) else {
                warn!(table, column, type_name, "skipping column of unknown type");
                continue;
            };
            if schema.tables.last().is_none_or(|t| t.name != table) {
                schema.tables.push(TableSchema {
                    name: table,
                    columns: Vec::new(),
                });
            }
            if let Some(last) = schema.tables.last_mut() {
                last.columns.push(ColumnSchema {
                    name: column,
                    data_type,
                });
            }
        }
        schema.tables.retain(|t| !t.columns.is_empty());
        Ok(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duckdb_executor_basic() {
        let mut db = DuckDbExecutor::new().expect("Failed to open DuckDB");
        db.execute("CREATE TABLE users (id INTEGER, name TEXT)")
            .expect("Failed to create table");
        db.execute("INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob')")
            .expect("Failed to insert data");

        let result = db
            .execute("SELECT * FROM users ORDER BY id")
            .expect("Failed to query data");
        assert_eq!(result.columns, vec!["id".to_string(), "name".to_string()]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[1][1], Value::Text("Bob".into()));
    }

    #[test]
    fn test_duckdb_executor_reset() {
        let mut db = DuckDbExecutor::new().expect("Failed to open DuckDB");
        db.execute("CREATE TABLE t0 (c0 INTEGER)").expect("create");
        db.execute("CREATE VIEW v0 AS SELECT * FROM t0").expect("view");
        db.reset().expect("Failed to reset");
        assert!(db.execute("SELECT * FROM t0").is_err());
        assert!(db.schema().expect("schema").is_empty());
    }

    #[test]
    fn test_duckdb_executor_null_handling() {
        let mut db = DuckDbExecutor::new().expect("Failed to open DuckDB");
        db.execute("CREATE TABLE test (id INTEGER, value INTEGER)")
            .expect("create");
        db.execute("INSERT INTO test VALUES (1, NULL), (2, 42)")
            .expect("insert");
        let result = db.execute("SELECT * FROM test ORDER BY id").expect("query");
        assert_eq!(result.rows[0][1], Value::Null);
        assert_eq!(result.rows[1][1], Value::Integer(42));
    }

    #[test]
    fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("target.duckdb");
        {
            let mut db = DuckDbExecutor::open(&path).expect("open");
            db.execute("CREATE TABLE t0 (c0 INTEGER)").expect("create");
            db.execute("INSERT INTO t0 VALUES (1), (NULL)").expect("insert");
        }
        let mut db = DuckDbExecutor::open(&path).expect("reopen");
        assert!(db.schema().expect("schema").table("t0").is_some());
        let result = db.execute("SELECT COUNT(*) FROM t0").expect("count");
        assert_eq!(result.rows[0][0].as_f64(), Some(2.0));
    }

    #[test]
    fn errors_are_classified() {
        let mut db = DuckDbExecutor::new().expect("Failed to open DuckDB");
        assert!(matches!(
            db.execute("SELEC 1"),
            Err(ExecutionError::Syntax(_))
        ));
        assert!(matches!(
            db.execute("SELECT * FROM missing"),
            Err(ExecutionError::Semantic(_))
        ));
        assert!(matches!(
            db.execute("SELECT CAST('a' AS INTEGER)"),
            Err(ExecutionError::Runtime(_))
        ));
    }

    #[test]
    fn schema_reports_typed_columns() {
        let mut db = DuckDbExecutor::new().expect("Failed to open DuckDB");
        db.execute("CREATE TABLE t0 (c0 INTEGER, c1 VARCHAR, c2 DOUBLE, c3 BOOLEAN)")
            .expect("create");
        db.execute("CREATE TABLE t1 (c0 BIGINT)").expect("create");
        let schema = db.schema().expect("schema");
        assert_eq!(schema.tables.len(), 2);
        let t0 = schema.table("t0").expect("t0");
        let types: Vec<DataType> = t0.columns.iter().map(|c| c.data_type).collect();
        assert_eq!(
            types,
            vec![DataType::Int, DataType::Text, DataType::Float, DataType::Boolean]
        );
    }

    #[test]
    fn aggregates_convert_to_numbers() {
        let mut db = DuckDbExecutor::new().expect("Failed to open DuckDB");
        let result = db
            .execute("SELECT SUM(x), AVG(x) FROM (VALUES (1), (2), (3), (4)) AS v(x)")
            .expect("query");
        assert_eq!(result.rows[0][0].as_f64(), Some(10.0));
        assert_eq!(result.rows[0][1], Value::Real(2.5));
    }

    #[test]
    fn long_statement_is_interrupted() {
        let mut db = DuckDbExecutor::new()
            .expect("Failed to open DuckDB")
            .with_statement_timeout(Some(Duration::from_millis(100)));
        let started = Instant::now();
        let result = db.execute("SELECT COUNT(*) FROM range(10000000) t1, range(1000000) t2");
        assert!(matches!(result, Err(ExecutionError::Timeout(100))), "{result:?}");
        assert!(started.elapsed() < Duration::from_secs(30));

        // The connection stays usable after the interrupt.
        let result = db.execute("SELECT 42").expect("query after interrupt");
        assert_eq!(result.rows[0][0], Value::Integer(42));
    }

    #[test]
    fn zero_budget_reports_timeout() {
        let mut db = DuckDbExecutor::new()
            .expect("Failed to open DuckDB")
            .with_statement_timeout(Some(Duration::ZERO));
        assert!(matches!(
            db.execute("SELECT 1"),
            Err(ExecutionError::Timeout(0))
        ));
    }
}
