//! `MigrationRecord` - rows of the `cashdesk_migrations` state table

use crate::executor::StoreError;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: i64,
    pub name: String,
    /// `SHA-256` checksum of the migration's statements
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    /// Execution time in milliseconds (`None` if not recorded)
    pub execution_time_ms: Option<i64>,
    pub success: bool,
}

impl MigrationRecord {
    /// Create a `MigrationRecord` from a state table row.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, StoreError> {
        Ok(Self {
            version: row
                .try_get("version")
                .map_err(|e| StoreError::parse("version", e))?,
            name: row.try_get("name").map_err(|e| StoreError::parse("name", e))?,
            checksum: row
                .try_get("checksum")
                .map_err(|e| StoreError::parse("checksum", e))?,
            applied_at: row
                .try_get("applied_at")
                .map_err(|e| StoreError::parse("applied_at", e))?,
            execution_time_ms: row
                .try_get("execution_time_ms")
                .map_err(|e| StoreError::parse("execution_time_ms", e))?,
            success: row
                .try_get("success")
                .map_err(|e| StoreError::parse("success", e))?,
        })
    }
}
