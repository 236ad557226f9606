//! Daily ledger store: one active snapshot per owner and date.

use crate::error::{CoreError, CoreResult};
use crate::executor::{Executor, StoreError};
use crate::model::{
    AuditAction, AuditEntry, ClientContext, OperationDraft, OperationRecord, OperationStatus,
    Totals,
};
use crate::pool::StorePool;
use crate::store::{column, json_column, to_json, AuditTrail, Page};
use crate::transaction::Transaction;
use chrono::NaiveDate;
use may_postgres::Row;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Insert attempts before a persistent key conflict is reported.
const MAX_UPSERT_ATTEMPTS: u32 = 3;

const INSERT_SAVEPOINT: &str = "operation_insert";

const OPERATION_COLUMNS: &str = "id, user_id, operation_date, balances, entries, totals, metadata, \
                                 status, created_at, updated_at";

/// Result of a save: the stored row and whether this call created it.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedOperation {
    pub record: OperationRecord,
    pub created: bool,
}

#[derive(Debug, Clone)]
pub struct OperationStore {
    pool: StorePool,
    audit: AuditTrail,
}

impl OperationStore {
    pub fn new(pool: StorePool, audit: AuditTrail) -> Self {
        Self { pool, audit }
    }

    /// Insert or overwrite the active snapshot of `(owner_id, draft.date)` and audit it.
    ///
    /// The row write and its `SAVE_OPERATION` record commit together.
    pub fn upsert(
        &self,
        owner_id: i64,
        draft: &OperationDraft,
        context: &ClientContext,
    ) -> CoreResult<SavedOperation> {
        draft.validate()?;
        let saved = self
            .pool
            .in_transaction(|tx| self.upsert_in(tx, owner_id, draft, context))?;

        #[cfg(feature = "metrics")]
        METRICS.record_operation_saved(saved.created);
        log::info!(
            "operation {} for owner {} on {} {}",
            saved.record.id,
            owner_id,
            saved.record.date,
            if saved.created { "created" } else { "overwritten" }
        );
        Ok(saved)
    }

    /// [`upsert`](Self::upsert) inside a caller-owned transaction.
    ///
    /// The owner row is share-locked and must be active, so a deactivation either waits for
    /// this save or is seen by it. An existing row is locked with `FOR UPDATE` and
    /// overwritten. Otherwise the insert runs under a savepoint; losing an insert race to a
    /// concurrent writer rolls back to the savepoint and the loop retries, this time finding
    /// the winner's row to overwrite.
    pub fn upsert_in(
        &self,
        tx: &Transaction,
        owner_id: i64,
        draft: &OperationDraft,
        context: &ClientContext,
    ) -> CoreResult<SavedOperation> {
        ensure_active_owner(tx, owner_id)?;
        let totals = Totals::from_entries(&draft.entries)?;
        let balances = to_json(&draft.balances)?;
        let entries = to_json(&draft.entries)?;
        let totals = to_json(&totals)?;
        let metadata = serde_json::Value::Object(draft.metadata.clone());

        for attempt in 1..=MAX_UPSERT_ATTEMPTS {
            let existing = tx.query_opt(
                &format!(
                    "SELECT {OPERATION_COLUMNS} FROM operations \
                     WHERE user_id = $1 AND operation_date = $2 AND status = 'active' \
                     FOR UPDATE"
                ),
                &[&owner_id, &draft.date],
            )?;

            if let Some(row) = existing {
                let previous = operation_from_row(&row)?;
                let row = tx.query_one(
                    &format!(
                        "UPDATE operations \
                         SET balances = $2, entries = $3, totals = $4, metadata = $5, updated_at = NOW() \
                         WHERE id = $1 \
                         RETURNING {OPERATION_COLUMNS}"
                    ),
                    &[&previous.id, &balances, &entries, &totals, &metadata],
                )?;
                let record = operation_from_row(&row)?;
                self.audit_save(tx, &record, Some(&previous), context)?;
                return Ok(SavedOperation {
                    record,
                    created: false,
                });
            }

            let savepoint = tx.savepoint(INSERT_SAVEPOINT).map_err(StoreError::from)?;
            let inserted = tx.query_one(
                &format!(
                    "INSERT INTO operations \
                     (user_id, operation_date, balances, entries, totals, metadata, status) \
                     VALUES ($1, $2, $3, $4, $5, $6, 'active') \
                     RETURNING {OPERATION_COLUMNS}"
                ),
                &[&owner_id, &draft.date, &balances, &entries, &totals, &metadata],
            );

            match inserted {
                Ok(row) => {
                    savepoint.release().map_err(StoreError::from)?;
                    let record = operation_from_row(&row)?;
                    self.audit_save(tx, &record, None, context)?;
                    return Ok(SavedOperation {
                        record,
                        created: true,
                    });
                }
                Err(e) if e.is_unique_violation() => {
                    savepoint.rollback().map_err(StoreError::from)?;
                    log::debug!(
                        "insert race on owner {} date {} (attempt {}), retrying as update",
                        owner_id,
                        draft.date,
                        attempt
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(CoreError::Conflict(format!(
            "operation for {} kept conflicting after {} attempts",
            draft.date, MAX_UPSERT_ATTEMPTS
        )))
    }

    fn audit_save(
        &self,
        tx: &Transaction,
        record: &OperationRecord,
        previous: Option<&OperationRecord>,
        context: &ClientContext,
    ) -> Result<i64, StoreError> {
        let mut entry =
            AuditEntry::new(AuditAction::SaveOperation, "operation", record.id.to_string())
                .actor(record.user_id)
            .new_value(record.snapshot())
            .context(context);
        if let Some(previous) = previous {
            entry = entry.old_value(previous.snapshot());
        }
        self.audit.append(tx, &entry)
    }

    /// Active snapshots of `owner_id`, most recent date first.
    pub fn list(&self, owner_id: i64, page: Page) -> CoreResult<Vec<OperationRecord>> {
        let conn = self.pool.acquire()?;
        let rows = conn.query_all(
            &format!(
                "SELECT {OPERATION_COLUMNS} FROM operations \
                 WHERE user_id = $1 AND status = 'active' \
                 ORDER BY operation_date DESC, id DESC \
                 LIMIT $2 OFFSET $3"
            ),
            &[&owner_id, &page.limit, &page.offset],
        )?;
        Ok(rows
            .iter()
            .map(operation_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_active(&self, owner_id: i64) -> CoreResult<i64> {
        let conn = self.pool.acquire()?;
        let row = conn.query_one(
            "SELECT COUNT(*) AS total FROM operations WHERE user_id = $1 AND status = 'active'",
            &[&owner_id],
        )?;
        Ok(column(&row, "total")?)
    }

    /// Archive every active snapshot dated before `cutoff`. Returns the number archived.
    pub fn archive_before(
        &self,
        executor: &dyn Executor,
        cutoff: NaiveDate,
    ) -> Result<u64, StoreError> {
        executor.execute(
            "UPDATE operations SET status = 'archived', updated_at = NOW() \
             WHERE status = 'active' AND operation_date < $1",
            &[&cutoff],
        )
    }
}

fn ensure_active_owner(tx: &Transaction, owner_id: i64) -> CoreResult<()> {
    let row = tx
        .query_opt("SELECT active FROM users WHERE id = $1 FOR SHARE", &[&owner_id])?
        .ok_or_else(|| CoreError::NotFound(format!("user {owner_id}")))?;
    if !column::<bool>(&row, "active")? {
        log::warn!("rejected save for deactivated owner {}", owner_id);
        return Err(CoreError::Forbidden("Account is deactivated".to_string()));
    }
    Ok(())
}

fn operation_from_row(row: &Row) -> Result<OperationRecord, StoreError> {
    let status: String = column(row, "status")?;
    Ok(OperationRecord {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        date: column(row, "operation_date")?,
        balances: json_column(row, "balances")?,
        entries: json_column(row, "entries")?,
        totals: json_column(row, "totals")?,
        metadata: json_column(row, "metadata")?,
        status: status
            .parse::<OperationStatus>()
            .map_err(|e| StoreError::parse("status", e))?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}
