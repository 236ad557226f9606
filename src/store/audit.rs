//! Append-only audit trail.

use crate::executor::{Executor, StoreError};
use crate::model::{AuditAction, AuditEntry, AuditRecord};
use crate::pool::StorePool;
use crate::store::{column, Page};
use chrono::{DateTime, Utc};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

const INSERT_AUDIT: &str = r#"
    INSERT INTO audit_log
        (user_id, action, entity_type, entity_id, old_value, new_value, ip_address, user_agent)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
    RETURNING id
"#;

const SELECT_AUDIT: &str = r#"
    SELECT a.id, a.user_id, u.username, a.action, a.entity_type, a.entity_id,
           a.old_value, a.new_value, a.ip_address, a.user_agent, a.created_at
    FROM audit_log a
    LEFT JOIN users u ON u.id = a.user_id
    WHERE ($1::BIGINT IS NULL OR a.user_id = $1)
    ORDER BY a.created_at DESC, a.id DESC
    LIMIT $2 OFFSET $3
"#;

/// Writer and reader of immutable audit records.
///
/// There is no update path. Rows leave the table only through
/// [`purge_older_than`](Self::purge_older_than).
#[derive(Debug, Clone)]
pub struct AuditTrail {
    pool: StorePool,
}

impl AuditTrail {
    pub fn new(pool: StorePool) -> Self {
        Self { pool }
    }

    /// Append one record through `executor`, normally the caller's open transaction.
    ///
    /// A failure here must abort that transaction; callers propagate it with `?`.
    pub fn append(&self, executor: &dyn Executor, entry: &AuditEntry) -> Result<i64, StoreError> {
        let action = entry.action.as_str();
        let row = executor.query_one(
            INSERT_AUDIT,
            &[
                &entry.actor_id,
                &action,
                &entry.entity_type,
                &entry.entity_id,
                &entry.old_value,
                &entry.new_value,
                &entry.context.ip_address,
                &entry.context.user_agent,
            ],
        )?;
        let id: i64 = column(&row, "id")?;

        #[cfg(feature = "metrics")]
        METRICS.record_audit_append();
        log::debug!("audit {} on {} by {:?}", action, entry.entity_type, entry.actor_id);
        Ok(id)
    }

    /// Append one record in a unit of work of its own.
    pub fn record(&self, entry: &AuditEntry) -> Result<i64, StoreError> {
        self.pool.in_transaction(|tx| self.append(tx, entry))
    }

    /// Records newest first, optionally restricted to one actor.
    pub fn query(&self, actor_id: Option<i64>, page: Page) -> Result<Vec<AuditRecord>, StoreError> {
        let conn = self.pool.acquire()?;
        let rows = conn.query_all(SELECT_AUDIT, &[&actor_id, &page.limit, &page.offset])?;
        rows.iter().map(audit_from_row).collect()
    }

    pub fn count(&self, actor_id: Option<i64>) -> Result<i64, StoreError> {
        let conn = self.pool.acquire()?;
        let row = conn.query_one(
            "SELECT COUNT(*) AS total FROM audit_log WHERE ($1::BIGINT IS NULL OR user_id = $1)",
            &[&actor_id],
        )?;
        column(&row, "total")
    }

    /// Delete records created before `cutoff`. Returns the number removed.
    pub fn purge_older_than(
        &self,
        executor: &dyn Executor,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        executor.execute("DELETE FROM audit_log WHERE created_at < $1", &[&cutoff])
    }
}

fn audit_from_row(row: &may_postgres::Row) -> Result<AuditRecord, StoreError> {
    let action: String = column(row, "action")?;
    Ok(AuditRecord {
        id: column(row, "id")?,
        user_id: column(row, "user_id")?,
        username: column(row, "username")?,
        action: action
            .parse::<AuditAction>()
            .map_err(|e| StoreError::parse("action", e))?,
        entity_type: column(row, "entity_type")?,
        entity_id: column(row, "entity_id")?,
        old_value: column(row, "old_value")?,
        new_value: column(row, "new_value")?,
        ip_address: column(row, "ip_address")?,
        user_agent: column(row, "user_agent")?,
        created_at: column(row, "created_at")?,
    })
}
