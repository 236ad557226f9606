//! Migration: Create audit log
//! Version: 20240101000003
//! Description: Append-only record of every mutating action

use crate::migration::{Migration, SchemaManager};

pub struct CreateAuditLog;

impl Migration for CreateAuditLog {
    fn name(&self) -> &str {
        "create_audit_log"
    }

    fn version(&self) -> i64 {
        20240101000003
    }

    fn up(&self, manager: &mut SchemaManager) {
        manager.raw(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT REFERENCES users(id) ON DELETE SET NULL,
                action VARCHAR(50) NOT NULL,
                entity_type VARCHAR(50) NOT NULL,
                entity_id VARCHAR(100),
                old_value JSONB,
                new_value JSONB,
                ip_address VARCHAR(64),
                user_agent TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        );
        manager.raw("CREATE INDEX IF NOT EXISTS idx_audit_log_user_id ON audit_log(user_id)");
        manager.raw(
            "CREATE INDEX IF NOT EXISTS idx_audit_log_created_at ON audit_log(created_at DESC)",
        );
        manager.raw("CREATE INDEX IF NOT EXISTS idx_audit_log_action ON audit_log(action)");
    }
}
