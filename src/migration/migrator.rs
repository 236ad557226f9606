//! Migrator - Core migration execution engine

use crate::executor::{Executor, StoreError};
use crate::migration::lock::MigrationLockGuard;
use crate::migration::state_table::STATE_TABLE;
use crate::migration::{
    calculate_checksum, initialize_state_table, Migration, MigrationError, MigrationRecord,
    MigrationStatus, PendingMigration, SchemaManager,
};
use crate::pool::StorePool;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// A registered migration together with its collected statements.
struct Planned {
    migration: Box<dyn Migration>,
    schema: SchemaManager,
    checksum: String,
}

/// Orchestrates validation, execution and state tracking of a fixed set of migrations.
pub struct Migrator {
    planned: Vec<Planned>,
    lock_timeout: Duration,
}

impl Migrator {
    /// Build a migrator over `migrations`, sorted by version.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DuplicateVersion` if two migrations share a version.
    pub fn new(migrations: Vec<Box<dyn Migration>>) -> Result<Self, MigrationError> {
        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(migrations.len());
        for migration in migrations {
            if !seen.insert(migration.version()) {
                return Err(MigrationError::DuplicateVersion(migration.version()));
            }
            let mut schema = SchemaManager::new();
            migration.up(&mut schema);
            let checksum = calculate_checksum(schema.statements());
            planned.push(Planned {
                migration,
                schema,
                checksum,
            });
        }
        planned.sort_by_key(|p| p.migration.version());

        Ok(Self {
            planned,
            lock_timeout: Duration::from_secs(60),
        })
    }

    /// How long [`up`](Self::up) waits for another process holding the migration lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Compare registered migrations with the state table.
    ///
    /// # Errors
    ///
    /// Fails on a checksum mismatch or an applied version this build does not know.
    pub fn status(&self, executor: &dyn Executor) -> Result<MigrationStatus, MigrationError> {
        initialize_state_table(executor)?;
        let applied = Self::query_applied_migrations(executor)?;

        let registered: HashSet<i64> = self.planned.iter().map(|p| p.migration.version()).collect();
        if let Some(unknown) = applied.iter().find(|r| !registered.contains(&r.version)) {
            return Err(MigrationError::UnknownApplied {
                version: unknown.version,
                name: unknown.name.clone(),
            });
        }

        let mut applied_records = Vec::new();
        let mut pending = Vec::new();
        for planned in &self.planned {
            let version = planned.migration.version();
            match applied.iter().find(|r| r.version == version) {
                Some(record) if record.checksum != planned.checksum => {
                    return Err(MigrationError::ChecksumMismatch {
                        version,
                        name: planned.migration.name().to_string(),
                        stored: record.checksum.clone(),
                        current: planned.checksum.clone(),
                    });
                }
                Some(record) => applied_records.push(record.clone()),
                None => pending.push(PendingMigration {
                    version,
                    name: planned.migration.name().to_string(),
                    checksum: planned.checksum.clone(),
                }),
            }
        }

        Ok(MigrationStatus::new(applied_records, pending))
    }

    /// Apply every pending migration, each in its own transaction.
    ///
    /// Concurrent callers serialize on a database advisory lock held on a dedicated
    /// connection for the whole run. Returns the number of migrations applied.
    pub fn up(&self, pool: &StorePool) -> Result<usize, MigrationError> {
        let session = pool.acquire()?;
        let _lock = MigrationLockGuard::acquire(&session, self.lock_timeout)?;

        let status = self.status(&session)?;
        if status.is_up_to_date() {
            log::debug!("No pending migrations to apply");
            return Ok(0);
        }

        let mut applied_count = 0;
        for pending in &status.pending {
            let Some(planned) = self
                .planned
                .iter()
                .find(|p| p.migration.version() == pending.version)
            else {
                continue;
            };

            let start = Instant::now();
            pool.in_transaction(|tx| -> Result<(), MigrationError> {
                planned
                    .schema
                    .apply(tx)
                    .map_err(|e| MigrationError::ExecutionFailed {
                        version: pending.version,
                        name: pending.name.clone(),
                        error: e.to_string(),
                    })?;
                let execution_time_ms =
                    i64::try_from(start.elapsed().as_millis()).unwrap_or(i64::MAX);
                Self::record_migration(tx, pending, execution_time_ms)?;
                Ok(())
            })?;

            log::info!(
                "Applied migration {} ({}) in {:?}",
                pending.version,
                pending.name,
                start.elapsed()
            );
            applied_count += 1;
        }

        Ok(applied_count)
    }

    fn query_applied_migrations(
        executor: &dyn Executor,
    ) -> Result<Vec<MigrationRecord>, MigrationError> {
        let sql = format!(
            "SELECT version, name, checksum, applied_at, execution_time_ms, success \
             FROM {STATE_TABLE} ORDER BY version ASC"
        );
        let rows = executor.query_all(&sql, &[])?;
        rows.iter()
            .map(|row| MigrationRecord::from_row(row).map_err(MigrationError::from))
            .collect()
    }

    fn record_migration(
        executor: &dyn Executor,
        pending: &PendingMigration,
        execution_time_ms: i64,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "INSERT INTO {STATE_TABLE} (version, name, checksum, applied_at, execution_time_ms, success) \
             VALUES ($1, $2, $3, NOW(), $4, true)"
        );
        executor.execute(
            &sql,
            &[
                &pending.version,
                &pending.name,
                &pending.checksum,
                &execution_time_ms,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(i64, &'static str);

    impl Migration for Fixed {
        fn name(&self) -> &str {
            self.1
        }

        fn version(&self) -> i64 {
            self.0
        }

        fn up(&self, manager: &mut SchemaManager) {
            manager.raw(format!("CREATE TABLE {} (id INT)", self.1));
        }
    }

    fn boxed(version: i64, name: &'static str) -> Box<dyn Migration> {
        Box::new(Fixed(version, name))
    }

    #[test]
    fn test_rejects_duplicate_versions() {
        let result = Migrator::new(vec![boxed(1, "a"), boxed(1, "b")]);
        assert!(matches!(result, Err(MigrationError::DuplicateVersion(1))));
    }

    #[test]
    fn test_orders_by_version() {
        let migrator = Migrator::new(vec![boxed(3, "c"), boxed(1, "a")]).unwrap();
        let versions: Vec<i64> = migrator.planned.iter().map(|p| p.migration.version()).collect();
        assert_eq!(versions, vec![1, 3]);
        assert_eq!(migrator.planned[0].checksum.len(), 64);
    }
}
