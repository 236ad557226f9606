//! Transaction Module
//!
//! A [`Transaction`] owns a pooled connection for its whole lifetime:
//! - `commit()` / `rollback()` close it explicitly
//! - dropping an open transaction rolls it back
//! - savepoints give a statement-level retry point inside the unit of work
//!
//! The connection goes back to the pool when the transaction is dropped, whichever way the
//! unit of work ended.

use crate::executor::{instrumented, is_connection_lost, Executor, StoreError};
use crate::pool::PooledConnection;
use may_postgres::types::ToSql;
use may_postgres::{Error as PostgresError, Row};
use std::fmt;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Transaction isolation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    /// Read committed (default)
    #[default]
    ReadCommitted,
    /// Repeatable read
    RepeatableRead,
    /// Serializable
    Serializable,
}

impl IsolationLevel {
    /// Convert to PostgreSQL SQL syntax
    fn to_sql(self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction error type
#[derive(Debug)]
pub enum TransactionError {
    /// PostgreSQL error from may_postgres
    PostgresError(PostgresError),
    /// Transaction already committed or rolled back
    TransactionClosed,
    /// Invalid savepoint usage
    SavepointError(String),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionError::PostgresError(e) => {
                write!(f, "PostgreSQL error: {}", e)
            }
            TransactionError::TransactionClosed => {
                write!(f, "Transaction has already been committed or rolled back")
            }
            TransactionError::SavepointError(s) => {
                write!(f, "Savepoint error: {}", s)
            }
        }
    }
}

impl std::error::Error for TransactionError {}

impl From<PostgresError> for TransactionError {
    fn from(err: PostgresError) -> Self {
        TransactionError::PostgresError(err)
    }
}

impl From<TransactionError> for StoreError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::PostgresError(e) => StoreError::PostgresError(e),
            TransactionError::TransactionClosed => {
                StoreError::Other("Transaction closed".to_string())
            }
            TransactionError::SavepointError(s) => StoreError::Other(s),
        }
    }
}

/// A database transaction bound to one pooled connection
pub struct Transaction {
    conn: PooledConnection,
    closed: bool,
}

impl Transaction {
    /// Start a transaction on `conn` with the given isolation level.
    pub fn begin(
        conn: PooledConnection,
        isolation_level: IsolationLevel,
    ) -> Result<Self, TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        let begin_sql = format!("BEGIN ISOLATION LEVEL {}", isolation_level.to_sql());
        if let Err(e) = conn.client().execute(begin_sql.as_str(), &[]) {
            if is_connection_lost(&e) {
                conn.mark_broken();
            }
            return Err(e.into());
        }

        Ok(Self {
            conn,
            closed: false,
        })
    }

    /// Create a named savepoint.
    ///
    /// Savepoints must be released or rolled back in LIFO order; the returned guard rolls
    /// back to the savepoint if dropped unresolved.
    pub fn savepoint(&self, name: &str) -> Result<Savepoint<'_>, TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(TransactionError::SavepointError(format!(
                "invalid savepoint name '{}'",
                name
            )));
        }

        self.run_control(&format!("SAVEPOINT {}", name))?;

        Ok(Savepoint {
            tx: self,
            name: name.to_string(),
            resolved: false,
        })
    }

    /// Commit the transaction
    pub fn commit(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.closed = true;
        if let Err(e) = self.conn.client().execute("COMMIT", &[]) {
            // Connection state is unknown after a failed COMMIT
            self.conn.mark_broken();
            return Err(e.into());
        }
        Ok(())
    }

    /// Rollback the transaction
    pub fn rollback(mut self) -> Result<(), TransactionError> {
        if self.closed {
            return Err(TransactionError::TransactionClosed);
        }
        self.closed = true;
        self.rollback_inner()
    }

    fn rollback_inner(&mut self) -> Result<(), TransactionError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        if let Err(e) = self.conn.client().execute("ROLLBACK", &[]) {
            self.conn.mark_broken();
            return Err(e.into());
        }
        Ok(())
    }

    /// Check if the transaction is closed
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run a transaction-control statement, discarding the connection if it was lost.
    fn run_control(&self, sql: &str) -> Result<(), TransactionError> {
        if let Err(e) = self.conn.client().execute(sql, &[]) {
            if is_connection_lost(&e) {
                self.conn.mark_broken();
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Other("Transaction is closed".to_string()));
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if let Err(e) = self.rollback_inner() {
                log::warn!("rollback of abandoned transaction failed: {}", e);
            }
        }
    }
}

impl Executor for Transaction {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        self.ensure_open()?;
        self.conn
            .observe(instrumented(query, || self.conn.client().execute(query, params)))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        self.ensure_open()?;
        self.conn
            .observe(instrumented(query, || self.conn.client().query_one(query, params)))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        self.ensure_open()?;
        self.conn
            .observe(instrumented(query, || self.conn.client().query(query, params)))
    }
}

/// A savepoint inside a [`Transaction`]
pub struct Savepoint<'t> {
    tx: &'t Transaction,
    name: String,
    resolved: bool,
}

impl Savepoint<'_> {
    /// Keep everything done since the savepoint.
    pub fn release(mut self) -> Result<(), TransactionError> {
        self.resolved = true;
        self.finish(&format!("RELEASE SAVEPOINT {}", self.name))
    }

    /// Discard everything done since the savepoint; the transaction stays usable.
    pub fn rollback(mut self) -> Result<(), TransactionError> {
        self.resolved = true;
        self.finish(&format!("ROLLBACK TO SAVEPOINT {}", self.name))
    }

    fn finish(&self, sql: &str) -> Result<(), TransactionError> {
        self.tx.run_control(sql)
    }
}

impl Drop for Savepoint<'_> {
    fn drop(&mut self) {
        if !self.resolved && !self.tx.closed {
            let sql = format!("ROLLBACK TO SAVEPOINT {}", self.name);
            if let Err(e) = self.finish(&sql) {
                log::warn!("rollback to savepoint {} failed: {}", self.name, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_level_to_sql() {
        assert_eq!(IsolationLevel::ReadCommitted.to_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::RepeatableRead.to_sql(), "REPEATABLE READ");
        assert_eq!(IsolationLevel::Serializable.to_sql(), "SERIALIZABLE");
        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
    }

    #[test]
    fn test_transaction_error_display() {
        let err = TransactionError::TransactionClosed;
        assert!(err
            .to_string()
            .contains("Transaction has already been committed"));

        let err = TransactionError::SavepointError("bad name".to_string());
        assert!(err.to_string().contains("Savepoint error"));
    }

    #[test]
    fn test_transaction_error_conversion() {
        let err: StoreError = TransactionError::TransactionClosed.into();
        assert!(err.to_string().contains("Transaction closed"));

        let err: StoreError = TransactionError::SavepointError("nested".to_string()).into();
        assert!(err.to_string().contains("nested"));
    }
}
