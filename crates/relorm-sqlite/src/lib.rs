//! SQLite backend for relorm.
//!
//! Wraps a [`rusqlite::Connection`] with foreign key enforcement switched
//! on. SQLite honors `DEFERRABLE INITIALLY DEFERRED`, so keys declared that
//! way are checked when the transaction commits.

use std::path::Path;

use relorm_core::{Connection, DialectKind, DriverError, Row, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::params_from_iter;
use tracing::debug;

/// A SQLite database connection.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, DriverError> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|e| DriverError::with_source("failed to open in-memory database", e))?;
        Self::from_connection(conn)
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let conn = rusqlite::Connection::open(path).map_err(|e| {
            DriverError::with_source(format!("failed to open database {}", path.display()), e)
        })?;
        debug!(path = %path.display(), "opened sqlite database");
        Self::from_connection(conn)
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: rusqlite::Connection) -> Result<Self, DriverError> {
        conn.execute_batch("PRAGMA foreign_keys = ON")
            .map_err(|e| DriverError::with_source("failed to enable foreign keys", e))?;
        Ok(Self { conn })
    }

    /// The underlying rusqlite connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }

    fn batch(&self, sql: &str) -> Result<(), DriverError> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| DriverError::with_source(format!("{} failed: {}", sql, e), e))
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.batch("BEGIN")
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.batch("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.batch("ROLLBACK")
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DriverError> {
        let rows = self
            .conn
            .execute(sql, params_from_iter(params.iter().map(to_sql)))
            .map_err(|e| statement_error(sql, e))?;
        Ok(rows as u64)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        let mut stmt = self.conn.prepare(sql).map_err(|e| statement_error(sql, e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .map_err(|e| statement_error(sql, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| statement_error(sql, e))? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value: SqlValue = row.get(i).map_err(|e| statement_error(sql, e))?;
                values.push(from_sql(value));
            }
            out.push(Row::new(columns.clone(), values));
        }
        Ok(out)
    }

    fn last_insert_id(&mut self) -> Result<Option<Value>, DriverError> {
        Ok(Some(Value::Int(self.conn.last_insert_rowid())))
    }
}

fn statement_error(sql: &str, error: rusqlite::Error) -> DriverError {
    DriverError::with_source(format!("{} (while running: {})", error, sql), error)
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Int(i),
        SqlValue::Real(f) => Value::Float(f),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Bytes(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_foreign_keys_enabled() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let rows = conn.query("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(rows[0].get_index(0), Some(&Value::Int(1)));
    }

    #[test]
    fn test_value_conversion() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (a integer, b real, c text, d blob, e integer)", &[])
            .unwrap();
        let inserted = conn
            .execute(
                "INSERT INTO t VALUES (?, ?, ?, ?, ?)",
                &[
                    Value::Int(7),
                    Value::Float(1.5),
                    Value::from("x"),
                    Value::Bytes(vec![1, 2]),
                    Value::Bool(true),
                ],
            )
            .unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(conn.last_insert_id().unwrap(), Some(Value::Int(1)));

        let rows = conn.query("SELECT a, b, c, d, e FROM t", &[]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("c"), Some(&Value::from("x")));
        assert_eq!(
            rows[0].values(),
            &[
                Value::Int(7),
                Value::Float(1.5),
                Value::from("x"),
                Value::Bytes(vec![1, 2]),
                Value::Int(1),
            ]
        );
    }

    #[test]
    fn test_statement_error_keeps_sql() {
        let mut conn = SqliteConnection::open_in_memory().unwrap();
        let err = conn.execute("INSERT INTO missing VALUES (1)", &[]).unwrap_err();
        assert!(err.message().contains("INSERT INTO missing"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
