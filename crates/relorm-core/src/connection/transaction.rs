//! Transaction guard over a connection.

use tracing::{debug, error, info, warn};

use crate::dialect::{DialectCapabilities, DialectKind};
use crate::error::Error;
use crate::metrics::SharedMetrics;

use super::value::display_params;
use super::{Connection, Row, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// One open transaction.
///
/// Every statement of a unit of work goes through the same guard. A guard
/// dropped while still active rolls the transaction back, so an error
/// anywhere in a cascade never leaves partial writes behind.
pub struct Transaction<'c> {
    conn: &'c mut dyn Connection,
    caps: &'static DialectCapabilities,
    state: TransactionState,
    metrics: Option<SharedMetrics>,
    log_statements: bool,
    statements: u64,
}

impl<'c> Transaction<'c> {
    /// Begin a transaction on a connection.
    pub fn begin(conn: &'c mut dyn Connection) -> Result<Self, Error> {
        conn.begin()?;
        let caps = conn.dialect().capabilities();
        debug!(dialect = %caps.kind, "transaction started");
        Ok(Self {
            conn,
            caps,
            state: TransactionState::Active,
            metrics: None,
            log_statements: true,
            statements: 0,
        })
    }

    /// Attach metrics.
    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Set whether statements are logged.
    pub fn with_statement_logging(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Engine of the underlying connection.
    pub fn dialect(&self) -> DialectKind {
        self.caps.kind
    }

    /// Capabilities of the underlying connection.
    pub fn capabilities(&self) -> &'static DialectCapabilities {
        self.caps
    }

    /// Statements issued so far.
    pub fn statement_count(&self) -> u64 {
        self.statements
    }

    pub(crate) fn metrics(&self) -> Option<&SharedMetrics> {
        self.metrics.as_ref()
    }

    fn before_statement(&mut self, sql: &str, params: &[Value]) -> Result<(), Error> {
        if self.state != TransactionState::Active {
            return Err(Error::Transaction("transaction is no longer active".to_string()));
        }
        if self.log_statements {
            debug!(sql = %sql, params = %display_params(params), "statement");
        }
        self.statements += 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_statement();
        }
        Ok(())
    }

    /// Execute a statement.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, Error> {
        self.before_statement(sql, params)?;
        Ok(self.conn.execute(sql, params)?)
    }

    /// Run a query.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, Error> {
        self.before_statement(sql, params)?;
        Ok(self.conn.query(sql, params)?)
    }

    /// Identity generated by the last insert.
    pub fn last_insert_id(&mut self) -> Result<Option<Value>, Error> {
        Ok(self.conn.last_insert_id()?)
    }

    /// Commit the transaction.
    ///
    /// If the commit itself fails (for example a deferred foreign key is
    /// violated), the guard stays active and rolls back when dropped.
    pub fn commit(mut self) -> Result<(), Error> {
        self.conn.commit()?;
        self.state = TransactionState::Committed;
        if let Some(metrics) = &self.metrics {
            metrics.record_commit();
        }
        info!(statements = self.statements, "transaction committed");
        Ok(())
    }

    /// Roll the transaction back.
    pub fn rollback(mut self) -> Result<(), Error> {
        self.finish_rollback()
    }

    fn finish_rollback(&mut self) -> Result<(), Error> {
        self.state = TransactionState::RolledBack;
        if let Some(metrics) = &self.metrics {
            metrics.record_rollback();
        }
        warn!(statements = self.statements, "rolling back transaction");
        Ok(self.conn.rollback()?)
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TransactionState::Active {
            if let Err(e) = self.finish_rollback() {
                error!(error = %e, "rollback of abandoned transaction failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::MockConnection;
    use crate::metrics::new_shared_metrics;

    #[test]
    fn test_commit() {
        let mut conn = MockConnection::new(DialectKind::Sqlite);
        let metrics = new_shared_metrics();
        {
            let mut tx = Transaction::begin(&mut conn).unwrap().with_metrics(metrics.clone());
            tx.execute("INSERT INTO t DEFAULT VALUES", &[]).unwrap();
            assert_eq!(tx.statement_count(), 1);
            tx.commit().unwrap();
        }
        assert_eq!(conn.control_log(), vec!["BEGIN", "COMMIT"]);
        assert_eq!(metrics.commits(), 1);
        assert_eq!(metrics.statements(), 1);
    }

    #[test]
    fn test_drop_rolls_back() {
        let mut conn = MockConnection::new(DialectKind::Postgres);
        let metrics = new_shared_metrics();
        {
            let mut tx = Transaction::begin(&mut conn).unwrap().with_metrics(metrics.clone());
            tx.execute("DELETE FROM t", &[]).unwrap();
        }
        assert_eq!(conn.control_log(), vec!["BEGIN", "ROLLBACK"]);
        assert_eq!(metrics.rollbacks(), 1);
    }

    #[test]
    fn test_failed_commit_rolls_back_on_drop() {
        let mut conn = MockConnection::new(DialectKind::Sqlite).failing_commit();
        {
            let tx = Transaction::begin(&mut conn).unwrap();
            assert!(matches!(tx.commit(), Err(Error::Driver(_))));
        }
        assert_eq!(conn.control_log(), vec!["BEGIN", "COMMIT", "ROLLBACK"]);
    }
}
