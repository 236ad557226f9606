//! Executor Module
//!
//! Provides the `Executor` trait that abstracts statement execution over `may_postgres`.
//!
//! Every store in the crate talks to PostgreSQL through this trait, so the same code runs
//! against a pooled connection or inside a [`Transaction`](crate::transaction::Transaction).

use may_postgres::error::SqlState;
use may_postgres::types::ToSql;
use may_postgres::{Client, Error as PostgresError, Row};
use std::fmt;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Storage error type
#[derive(Debug)]
pub enum StoreError {
    /// `PostgreSQL` error from `may_postgres`
    PostgresError(PostgresError),
    /// Could not open a connection
    ConnectionError(String),
    /// No connection became available within the pool timeout
    PoolExhausted { waited: Duration },
    /// Query execution error
    QueryError(String),
    /// Row parsing/conversion error
    ParseError(String),
    /// Other storage errors
    Other(String),
}

impl StoreError {
    /// Whether the error is a unique constraint violation (SQLSTATE 23505).
    ///
    /// Checked on the structured SQLSTATE; server messages follow `lc_messages`.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::PostgresError(e) => e.code() == Some(&SqlState::UNIQUE_VIOLATION),
            _ => false,
        }
    }

    /// Whether the connection that produced this error should be thrown away.
    pub fn is_connection_failure(&self) -> bool {
        match self {
            StoreError::PostgresError(e) => is_connection_lost(e),
            StoreError::ConnectionError(_) => true,
            _ => false,
        }
    }

    /// Whether the error represents a "no rows found" condition.
    ///
    /// Only specific patterns are matched so that "table not found" and friends are not
    /// mistaken for an empty result.
    pub fn is_no_rows(&self) -> bool {
        let msg = match self {
            StoreError::PostgresError(e) => e.to_string(),
            StoreError::QueryError(s) | StoreError::Other(s) => s.clone(),
            _ => return false,
        };
        let msg = msg.to_lowercase();
        msg.contains("no rows")
            || msg.contains("row not found")
            || msg.contains("expected one row")
            || msg.contains("query returned an unexpected number of rows")
    }

    /// Wrap a column decoding failure.
    pub fn parse(column: &str, err: impl fmt::Display) -> Self {
        StoreError::ParseError(format!("column `{column}`: {err}"))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::PostgresError(e) => write!(f, "PostgreSQL error: {e}"),
            StoreError::ConnectionError(s) => write!(f, "Connection error: {s}"),
            StoreError::PoolExhausted { waited } => {
                write!(f, "Connection pool exhausted after waiting {}ms", waited.as_millis())
            }
            StoreError::QueryError(s) => write!(f, "Query error: {s}"),
            StoreError::ParseError(s) => write!(f, "Parse error: {s}"),
            StoreError::Other(s) => write!(f, "Storage error: {s}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::PostgresError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PostgresError> for StoreError {
    fn from(err: PostgresError) -> Self {
        StoreError::PostgresError(err)
    }
}

/// Trait for executing database statements
///
/// Implemented by [`PooledConnection`](crate::pool::PooledConnection) and
/// [`Transaction`](crate::transaction::Transaction), so stores can be written once and
/// composed into a caller-owned unit of work.
pub trait Executor {
    /// Execute a SQL statement and return the number of rows affected
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the statement fails.
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError>;

    /// Execute a query that must return exactly one row
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails or does not return exactly one row.
    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError>;

    /// Execute a query and return all rows
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails.
    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError>;

    /// Execute a query and return the first row, if any
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the query fails.
    fn query_opt(&self, query: &str, params: &[&dyn ToSql]) -> Result<Option<Row>, StoreError> {
        Ok(self.query_all(query, params)?.into_iter().next())
    }
}

/// Closed socket, I/O failure, or a server-side connection exception (class 08) or
/// shutdown (class 57P).
pub(crate) fn is_connection_lost(err: &PostgresError) -> bool {
    if err.is_closed() {
        return true;
    }
    if let Some(state) = err.code() {
        let code = state.code();
        return code.starts_with("08") || code.starts_with("57P");
    }
    std::error::Error::source(err).is_some_and(|source| source.is::<std::io::Error>())
}

/// Run one statement on a raw client with the crate's spans and metrics around it.
pub(crate) fn instrumented<T>(
    query: &str,
    op: impl FnOnce() -> Result<T, PostgresError>,
) -> Result<T, StoreError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::execute_query_span(query).entered();
    #[cfg(not(feature = "tracing"))]
    let _ = query;

    let start = Instant::now();
    let result = op().map_err(|e| {
        #[cfg(feature = "metrics")]
        METRICS.record_query_error();
        StoreError::PostgresError(e)
    });

    let duration = start.elapsed();
    #[cfg(feature = "metrics")]
    METRICS.record_query_duration(duration);
    #[cfg(not(feature = "metrics"))]
    let _ = duration;

    result
}

impl Executor for Client {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        instrumented(query, || Client::execute(self, query, params))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        instrumented(query, || Client::query_one(self, query, params))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        instrumented(query, || Client::query(self, query, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let err = StoreError::QueryError("test error".to_string());
        assert!(err.to_string().contains("Query error"));

        let err = StoreError::PoolExhausted {
            waited: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "Connection pool exhausted after waiting 250ms"
        );
    }

    #[test]
    fn test_no_rows_detection_is_specific() {
        assert!(StoreError::QueryError("query returned no rows".into()).is_no_rows());
        assert!(StoreError::Other("Expected one row".into()).is_no_rows());
        assert!(!StoreError::Other("table not found".into()).is_no_rows());
        assert!(!StoreError::ParseError("no rows".into()).is_no_rows());
    }

    #[test]
    fn test_unique_violation_requires_database_error() {
        let err = StoreError::QueryError("duplicate key value violates unique constraint".into());
        assert!(!err.is_unique_violation());
    }

    #[test]
    fn test_connection_failure_classification() {
        assert!(StoreError::ConnectionError("connection refused".into()).is_connection_failure());
        assert!(!StoreError::PoolExhausted {
            waited: Duration::from_secs(1)
        }
        .is_connection_failure());
        assert!(!StoreError::ParseError("bad column".into()).is_connection_failure());
        assert!(!StoreError::QueryError("connection closed".into()).is_connection_failure());
    }

    #[test]
    fn test_parse_helper_names_column() {
        let err = StoreError::parse("balances", "invalid type");
        assert_eq!(err.to_string(), "Parse error: column `balances`: invalid type");
    }
}
