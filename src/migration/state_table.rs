//! Migration state table management

use crate::executor::{Executor, StoreError};

pub const STATE_TABLE: &str = "cashdesk_migrations";

/// Create the [`STATE_TABLE`] and its index if they don't exist.
pub fn initialize_state_table(executor: &dyn Executor) -> Result<(), StoreError> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {STATE_TABLE} (
            version BIGINT PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            checksum VARCHAR(64) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            execution_time_ms BIGINT,
            success BOOLEAN NOT NULL DEFAULT true
        )
    "#
    );
    executor.execute(&sql, &[])?;

    let index_sql = format!(
        "CREATE INDEX IF NOT EXISTS idx_{STATE_TABLE}_applied_at ON {STATE_TABLE}(applied_at)"
    );
    executor.execute(&index_sql, &[])?;

    Ok(())
}
