//! Migration status tracking

use crate::migration::MigrationRecord;

/// Applied and pending migrations at one point in time.
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Applied migrations (from database)
    pub applied: Vec<MigrationRecord>,
    /// Registered migrations not yet applied, in version order
    pub pending: Vec<PendingMigration>,
}

/// Represents a pending migration (not yet applied)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
}

impl MigrationStatus {
    pub fn new(applied: Vec<MigrationRecord>, pending: Vec<PendingMigration>) -> Self {
        Self { applied, pending }
    }

    /// Check if all migrations are applied
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Get the latest applied migration version
    pub fn latest_applied_version(&self) -> Option<i64> {
        self.applied.iter().map(|m| m.version).max()
    }

    /// Get the next pending migration version
    pub fn next_pending_version(&self) -> Option<i64> {
        self.pending.first().map(|m| m.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(version: i64) -> MigrationRecord {
        MigrationRecord {
            version,
            name: format!("m{version}"),
            checksum: "00".repeat(32),
            applied_at: Utc::now(),
            execution_time_ms: Some(3),
            success: true,
        }
    }

    #[test]
    fn test_status_summary() {
        let status = MigrationStatus::new(
            vec![record(20240101000001), record(20240101000002)],
            vec![PendingMigration {
                version: 20240101000003,
                name: "create_audit_log".into(),
                checksum: "ab".repeat(32),
            }],
        );
        assert!(!status.is_up_to_date());
        assert_eq!(status.latest_applied_version(), Some(20240101000002));
        assert_eq!(status.next_pending_version(), Some(20240101000003));

        let empty = MigrationStatus::new(vec![], vec![]);
        assert!(empty.is_up_to_date());
        assert_eq!(empty.latest_applied_version(), None);
    }
}
