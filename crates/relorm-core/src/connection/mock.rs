//! Recording connection for unit tests.

use std::collections::HashMap;

use crate::dialect::DialectKind;
use crate::error::DriverError;

use super::{Connection, Row, Value};

/// Connection that records statements instead of running them.
///
/// Queries return no rows unless a response was registered for a SQL
/// prefix. Inserts hand out increasing identities.
pub(crate) struct MockConnection {
    dialect: DialectKind,
    control: Vec<String>,
    statements: Vec<(String, Vec<Value>)>,
    responses: HashMap<String, Vec<Row>>,
    next_id: i64,
    fail_commit: bool,
}

impl MockConnection {
    pub(crate) fn new(dialect: DialectKind) -> Self {
        Self {
            dialect,
            control: Vec::new(),
            statements: Vec::new(),
            responses: HashMap::new(),
            next_id: 0,
            fail_commit: false,
        }
    }

    pub(crate) fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub(crate) fn respond(mut self, sql_prefix: &str, rows: Vec<Row>) -> Self {
        self.responses.insert(sql_prefix.to_string(), rows);
        self
    }

    pub(crate) fn control_log(&self) -> Vec<&str> {
        self.control.iter().map(String::as_str).collect()
    }

    pub(crate) fn statements(&self) -> Vec<&str> {
        self.statements.iter().map(|(sql, _)| sql.as_str()).collect()
    }

    pub(crate) fn writes(&self) -> Vec<&str> {
        self.statements()
            .into_iter()
            .filter(|sql| !sql.starts_with("SELECT"))
            .collect()
    }

    pub(crate) fn params(&self, index: usize) -> &[Value] {
        &self.statements[index].1
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> DialectKind {
        self.dialect
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.control.push("BEGIN".into());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.control.push("COMMIT".into());
        if self.fail_commit {
            return Err(DriverError::new("deferred constraint violated at commit"));
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.control.push("ROLLBACK".into());
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DriverError> {
        self.statements.push((sql.to_string(), params.to_vec()));
        if sql.starts_with("INSERT") {
            self.next_id += 1;
        }
        Ok(1)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        self.statements.push((sql.to_string(), params.to_vec()));
        if sql.starts_with("INSERT") {
            self.next_id += 1;
            return Ok(vec![Row::new(vec!["id".into()], vec![Value::Int(self.next_id)])]);
        }
        Ok(self
            .responses
            .iter()
            .find(|(prefix, _)| sql.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn last_insert_id(&mut self) -> Result<Option<Value>, DriverError> {
        Ok(Some(Value::Int(self.next_id)))
    }
}
