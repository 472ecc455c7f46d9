//! Abstract SQL connection.
//!
//! The engine only talks to a database through [`Connection`]. Statements
//! are issued one at a time; each call blocks until the database answers.

mod row;
mod transaction;
mod value;

#[cfg(test)]
pub(crate) mod mock;

pub use row::Row;
pub use transaction::Transaction;
pub use value::Value;

use crate::dialect::DialectKind;
use crate::error::DriverError;

/// A SQL-capable connection to one database.
pub trait Connection {
    /// Engine behind this connection.
    fn dialect(&self) -> DialectKind;

    /// Start a transaction.
    fn begin(&mut self) -> Result<(), DriverError>;

    /// Commit the current transaction.
    fn commit(&mut self) -> Result<(), DriverError>;

    /// Roll back the current transaction.
    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Execute a statement and return the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DriverError>;

    /// Run a query and return every row.
    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError>;

    /// Identity generated by the last insert, for engines without `RETURNING`.
    fn last_insert_id(&mut self) -> Result<Option<Value>, DriverError> {
        Ok(None)
    }
}

impl<C: Connection + ?Sized> Connection for Box<C> {
    fn dialect(&self) -> DialectKind {
        (**self).dialect()
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        (**self).begin()
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        (**self).commit()
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        (**self).rollback()
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, DriverError> {
        (**self).execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        (**self).query(sql, params)
    }

    fn last_insert_id(&mut self) -> Result<Option<Value>, DriverError> {
        (**self).last_insert_id()
    }
}
