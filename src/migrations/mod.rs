//! Built-in schema of the service.

mod m20240101000001_create_users;
mod m20240101000002_create_operations;
mod m20240101000003_create_audit_log;

pub use m20240101000001_create_users::CreateUsers;
pub use m20240101000002_create_operations::CreateOperations;
pub use m20240101000003_create_audit_log::CreateAuditLog;

use crate::migration::{Migration, MigrationError, Migrator};

/// Every migration shipped with this build, in version order.
pub fn all() -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(CreateUsers),
        Box::new(CreateOperations),
        Box::new(CreateAuditLog),
    ]
}

/// A [`Migrator`] over [`all`].
pub fn migrator() -> Result<Migrator, MigrationError> {
    Migrator::new(all())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::SchemaManager;

    fn statements(migration: &dyn Migration) -> Vec<String> {
        let mut manager = SchemaManager::new();
        migration.up(&mut manager);
        manager.statements().to_vec()
    }

    #[test]
    fn test_builtin_migrations_register() {
        assert!(migrator().is_ok());
        let versions: Vec<i64> = all().iter().map(|m| m.version()).collect();
        let mut sorted = versions.clone();
        sorted.sort_unstable();
        assert_eq!(versions, sorted);
    }

    #[test]
    fn test_operations_have_partial_unique_key() {
        let sql = statements(&CreateOperations).join("\n");
        assert!(sql.contains("CREATE UNIQUE INDEX IF NOT EXISTS uq_operations_active_owner_date"));
        assert!(sql.contains("WHERE status = 'active'"));
        assert!(sql.contains("CHECK (status IN ('active', 'archived', 'deleted'))"));
    }

    #[test]
    fn test_users_carry_lockout_columns() {
        let sql = statements(&CreateUsers).join("\n");
        assert!(sql.contains("\"login_attempts\""));
        assert!(sql.contains("\"locked_until\""));
    }

    #[test]
    fn test_audit_log_is_indexed_by_actor_and_time() {
        let sql = statements(&CreateAuditLog).join("\n");
        assert!(sql.contains("idx_audit_log_user_id"));
        assert!(sql.contains("idx_audit_log_created_at"));
    }
}
