//! Advisory-lock based migration locking

use crate::executor::{Executor, StoreError};
use crate::migration::MigrationError;
use std::time::{Duration, Instant};

/// Advisory lock key shared by every process migrating the same database.
const MIGRATION_LOCK_KEY: i64 = 0x6361_7368_6465_736b;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Holds the session-level migration lock; releases it when dropped.
///
/// The executor must be a plain session (not a transaction) that outlives the guard, since
/// advisory locks belong to the connection that took them.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn Executor,
}

impl<'a> MigrationLockGuard<'a> {
    /// Poll `pg_try_advisory_lock` until it succeeds or `timeout` runs out.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if the lock cannot be acquired in time.
    pub fn acquire(executor: &'a dyn Executor, timeout: Duration) -> Result<Self, MigrationError> {
        let start = Instant::now();
        loop {
            let row =
                executor.query_one("SELECT pg_try_advisory_lock($1)", &[&MIGRATION_LOCK_KEY])?;
            let acquired: bool = row.try_get(0).map_err(|e| {
                MigrationError::Database(StoreError::parse("pg_try_advisory_lock", e))
            })?;
            if acquired {
                log::debug!("migration lock acquired after {:?}", start.elapsed());
                return Ok(Self { executor });
            }

            if start.elapsed() >= timeout {
                return Err(MigrationError::LockTimeout(format!(
                    "failed to acquire migration lock within {} seconds",
                    timeout.as_secs()
                )));
            }
            may::coroutine::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self
            .executor
            .execute("SELECT pg_advisory_unlock($1)", &[&MIGRATION_LOCK_KEY])
        {
            log::warn!("failed to release migration lock: {}", e);
        }
    }
}
