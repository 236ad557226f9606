//! Retention sweep: archive old ledger snapshots and purge old audit records.

use crate::config::RetentionConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{AuditAction, AuditEntry};
use crate::pool::StorePool;
use crate::store::{AuditTrail, OperationStore};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// What one sweep changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub archived_operations: u64,
    pub purged_audit_records: u64,
}

#[derive(Debug, Clone)]
pub struct Maintenance {
    pool: StorePool,
    operations: OperationStore,
    audit: AuditTrail,
    retention: RetentionConfig,
}

impl Maintenance {
    pub fn new(
        pool: StorePool,
        operations: OperationStore,
        audit: AuditTrail,
        retention: RetentionConfig,
    ) -> Self {
        Self {
            pool,
            operations,
            audit,
            retention,
        }
    }

    /// Run both retention steps as of `now`, each in its own unit of work.
    ///
    /// Steps that changed rows are audited with no actor.
    pub fn run_once(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let archive_cutoff = cutoff(now, self.retention.operation_archive_days)?.date_naive();
        let archived_operations = self.pool.in_transaction(|tx| -> CoreResult<u64> {
            let archived = self.operations.archive_before(tx, archive_cutoff)?;
            if archived > 0 {
                self.audit.append(
                    tx,
                    &AuditEntry::untargeted(AuditAction::ArchiveOperations, "operation").new_value(
                        serde_json::json!({ "before": archive_cutoff, "count": archived }),
                    ),
                )?;
            }
            Ok(archived)
        })?;

        let purge_cutoff = cutoff(now, self.retention.audit_retention_days)?;
        let purged_audit_records = self.pool.in_transaction(|tx| -> CoreResult<u64> {
            let purged = self.audit.purge_older_than(tx, purge_cutoff)?;
            if purged > 0 {
                self.audit.append(
                    tx,
                    &AuditEntry::untargeted(AuditAction::PurgeAuditLog, "audit_log").new_value(
                        serde_json::json!({ "before": purge_cutoff, "count": purged }),
                    ),
                )?;
            }
            Ok(purged)
        })?;

        let report = SweepReport {
            archived_operations,
            purged_audit_records,
        };
        log::info!(
            "retention sweep: {} operation(s) archived, {} audit record(s) purged",
            report.archived_operations,
            report.purged_audit_records
        );
        Ok(report)
    }

    /// Run [`run_once`](Self::run_once) every `sweep_interval_minutes` on a coroutine.
    pub fn spawn_periodic(self) -> may::coroutine::JoinHandle<()> {
        let minutes = self.retention.sweep_interval_minutes.max(1);
        let interval = std::time::Duration::from_secs(minutes.saturating_mul(60));
        may::go!(move || loop {
            if let Err(e) = self.run_once(Utc::now()) {
                log::error!("retention sweep failed: {}", e);
            }
            may::coroutine::sleep(interval);
        })
    }
}

/// `now` minus `days`, or an error when that leaves the calendar `chrono` can represent.
fn cutoff(now: DateTime<Utc>, days: i64) -> CoreResult<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|age| now.checked_sub_signed(age))
        .ok_or_else(|| CoreError::Internal(format!("retention of {days} days is out of range")))
}
