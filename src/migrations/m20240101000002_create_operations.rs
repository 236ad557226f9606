//! Migration: Create operations
//! Version: 20240101000002
//! Description: Daily ledger snapshots, one active row per owner and date

use crate::migration::{Migration, SchemaManager};

pub struct CreateOperations;

impl Migration for CreateOperations {
    fn name(&self) -> &str {
        "create_operations"
    }

    fn version(&self) -> i64 {
        20240101000002
    }

    fn up(&self, manager: &mut SchemaManager) {
        manager.raw(
            r#"
            CREATE TABLE IF NOT EXISTS operations (
                id BIGSERIAL PRIMARY KEY,
                user_id BIGINT NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
                operation_date DATE NOT NULL,
                balances JSONB NOT NULL DEFAULT '{}'::jsonb,
                entries JSONB NOT NULL DEFAULT '[]'::jsonb,
                totals JSONB NOT NULL DEFAULT '{}'::jsonb,
                metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
                status VARCHAR(16) NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active', 'archived', 'deleted')),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        );

        // Archived and deleted rows may share a key with the active one
        manager.raw(
            "CREATE UNIQUE INDEX IF NOT EXISTS uq_operations_active_owner_date \
             ON operations(user_id, operation_date) WHERE status = 'active'",
        );
        manager.raw(
            "CREATE INDEX IF NOT EXISTS idx_operations_owner_date \
             ON operations(user_id, operation_date DESC)",
        );
        manager.raw(
            "CREATE INDEX IF NOT EXISTS idx_operations_status_date \
             ON operations(status, operation_date)",
        );
    }
}
