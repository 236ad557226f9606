//! Store pool: persistent `may_postgres` connection slots with bounded acquisition.
//!
//! Connections are opened lazily up to `max_connections`. Idle clients are parked on a
//! bounded `crossbeam-channel`; a caller that finds neither an idle client nor a free slot
//! waits on the channel for at most `pool_timeout` and then fails with
//! [`StoreError::PoolExhausted`].
//!
//! A connection that fails at the connection level is discarded on release together with
//! every idle client, so a database restart costs one failed statement rather than a pool
//! full of dead sockets.

use crate::connection::{check_connection_health, connect, validate_connection_string};
use crate::executor::{instrumented, Executor, StoreError};
use crate::pool::config::DatabaseConfig;
use crate::transaction::{IsolationLevel, Transaction};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use may_postgres::types::ToSql;
use may_postgres::{Client, Row};
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

struct PoolInner {
    url: String,
    max_size: usize,
    timeout: Duration,
    opened: AtomicUsize,
    idle_tx: Sender<Client>,
    idle_rx: Receiver<Client>,
}

/// Cloneable handle to the shared connection pool.
///
/// Components receive a `StorePool` at construction; there is no global pool.
#[derive(Clone)]
pub struct StorePool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for StorePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorePool")
            .field("max_size", &self.inner.max_size)
            .field("opened", &self.inner.opened.load(Ordering::Relaxed))
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl StorePool {
    /// Build a pool from configuration. No connection is opened until first use.
    pub fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        validate_connection_string(&config.url)?;
        if config.max_connections == 0 {
            return Err(StoreError::Other(
                "max_connections must be at least 1".to_string(),
            ));
        }

        let (idle_tx, idle_rx) = bounded(config.max_connections);
        Ok(Self {
            inner: Arc::new(PoolInner {
                url: config.url.clone(),
                max_size: config.max_connections,
                timeout: config.pool_timeout(),
                opened: AtomicUsize::new(0),
                idle_tx,
                idle_rx,
            }),
        })
    }

    /// Borrow a connection, waiting at most the configured timeout.
    pub fn acquire(&self) -> Result<PooledConnection, StoreError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_connection_span().entered();

        let start = Instant::now();
        let result = self.acquire_inner();

        #[cfg(feature = "metrics")]
        METRICS.record_pool_wait(start.elapsed());

        match result {
            Ok(client) => Ok(PooledConnection {
                client: Some(client),
                pool: Arc::clone(&self.inner),
                broken: Cell::new(false),
            }),
            Err(e) => {
                if let StoreError::PoolExhausted { .. } = e {
                    #[cfg(feature = "metrics")]
                    METRICS.record_pool_exhausted();
                    log::warn!(
                        "connection pool exhausted ({} connections) after {:?}",
                        self.inner.max_size,
                        start.elapsed()
                    );
                }
                Err(e)
            }
        }
    }

    fn acquire_inner(&self) -> Result<Client, StoreError> {
        if let Ok(client) = self.inner.idle_rx.try_recv() {
            return Ok(client);
        }

        // Reserve a slot before connecting so concurrent callers never exceed max_size
        let mut opened = self.inner.opened.load(Ordering::Acquire);
        while opened < self.inner.max_size {
            match self.inner.opened.compare_exchange(
                opened,
                opened + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return connect(&self.inner.url).map_err(|e| {
                        self.inner.discard();
                        StoreError::from(e)
                    });
                }
                Err(current) => opened = current,
            }
        }

        match self.inner.idle_rx.recv_timeout(self.inner.timeout) {
            Ok(client) => Ok(client),
            Err(RecvTimeoutError::Timeout) => Err(StoreError::PoolExhausted {
                waited: self.inner.timeout,
            }),
            Err(RecvTimeoutError::Disconnected) => {
                Err(StoreError::Other("connection pool closed".to_string()))
            }
        }
    }

    /// Run `f` as one unit of work.
    ///
    /// Commits when `f` returns `Ok`, rolls back when it returns `Err`. The connection is
    /// released on every path, including a panic inside `f`.
    pub fn in_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        self.in_transaction_with(IsolationLevel::ReadCommitted, f)
    }

    /// [`in_transaction`](Self::in_transaction) with an explicit isolation level.
    pub fn in_transaction_with<T, E, F>(&self, isolation: IsolationLevel, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction) -> Result<T, E>,
        E: From<StoreError>,
    {
        let conn = self.acquire()?;
        let tx = Transaction::begin(conn, isolation).map_err(StoreError::from)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit().map_err(StoreError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::warn!("rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Check that the store answers.
    ///
    /// A stale connection is retried once on a fresh one.
    pub fn ping(&self) -> Result<bool, StoreError> {
        match self.ping_once() {
            Err(e) if e.is_connection_failure() => {
                log::warn!("ping failed on a stale connection, retrying: {}", e);
                self.ping_once()
            }
            other => other,
        }
    }

    fn ping_once(&self) -> Result<bool, StoreError> {
        let conn = self.acquire()?;
        check_connection_health(&conn)
    }

    /// Maximum number of connections this pool opens.
    pub fn max_size(&self) -> usize {
        self.inner.max_size
    }

    /// Connections currently open (idle or borrowed).
    pub fn open_connections(&self) -> usize {
        self.inner.opened.load(Ordering::Acquire)
    }
}

/// A connection borrowed from a [`StorePool`]; returned to the pool on drop.
pub struct PooledConnection {
    client: Option<Client>,
    pool: Arc<PoolInner>,
    broken: Cell<bool>,
}

impl PooledConnection {
    /// The underlying `may_postgres` client.
    pub fn client(&self) -> &Client {
        // Only `Drop` takes the client out
        self.client
            .as_ref()
            .unwrap_or_else(|| unreachable!("pooled connection used after release"))
    }

    /// Discard this connection instead of returning it to the pool.
    pub fn mark_broken(&self) {
        self.broken.set(true);
    }

    pub fn is_broken(&self) -> bool {
        self.broken.get()
    }

    /// Mark the connection broken when `result` failed at the connection level.
    pub(crate) fn observe<T>(&self, result: Result<T, StoreError>) -> Result<T, StoreError> {
        if let Err(e) = &result {
            if e.is_connection_failure() {
                self.mark_broken();
            }
        }
        result
    }
}

impl PoolInner {
    fn discard(&self) {
        self.opened.fetch_sub(1, Ordering::AcqRel);
    }

    /// Drop every idle client; they share the fate of the one that just failed.
    fn discard_idle(&self) -> usize {
        let mut dropped = 0;
        while let Ok(client) = self.idle_rx.try_recv() {
            drop(client);
            self.discard();
            dropped += 1;
        }
        dropped
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        if self.broken.get() {
            drop(client);
            self.pool.discard();
            let idle = self.pool.discard_idle();
            log::warn!(
                "discarded broken pooled connection and {} idle connection(s)",
                idle
            );
            return;
        }
        if self.pool.idle_tx.try_send(client).is_err() {
            self.pool.discard();
        }
    }
}

impl Executor for PooledConnection {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        self.observe(instrumented(query, || self.client().execute(query, params)))
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        self.observe(instrumented(query, || self.client().query_one(query, params)))
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        self.observe(instrumented(query, || self.client().query(query, params)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str, max_connections: usize) -> DatabaseConfig {
        DatabaseConfig {
            url: url.to_string(),
            max_connections,
            pool_timeout_seconds: 1,
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_pool_is_lazy() {
        let pool = StorePool::new(&config("postgres://u:p@127.0.0.1:1/none", 4))
            .expect("pool construction must not connect");
        assert_eq!(pool.max_size(), 4);
        assert_eq!(pool.open_connections(), 0);
    }

    #[test]
    fn test_pool_rejects_invalid_config() {
        assert!(StorePool::new(&config("not a url", 4)).is_err());
        assert!(StorePool::new(&config("postgres://u:p@localhost/db", 0)).is_err());
    }

    #[test]
    fn test_failed_connect_releases_slot() {
        let pool = StorePool::new(&config("postgres://u:p@127.0.0.1:1/none", 1)).unwrap();
        assert!(pool.acquire().is_err());
        assert_eq!(pool.open_connections(), 0);
    }
}
