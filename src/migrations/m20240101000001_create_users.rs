//! Migration: Create users
//! Version: 20240101000001
//! Description: Accounts with role, activation flag and lockout state

use crate::migration::{Migration, SchemaManager};
use sea_query::{ColumnDef, Expr, Index, Table};

pub struct CreateUsers;

impl Migration for CreateUsers {
    fn name(&self) -> &str {
        "create_users"
    }

    fn version(&self) -> i64 {
        20240101000001
    }

    fn up(&self, manager: &mut SchemaManager) {
        manager.create_table(
            Table::create()
                .table("users")
                .if_not_exists()
                .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
                .col(ColumnDef::new("username").string().string_len(64).not_null().unique_key())
                .col(ColumnDef::new("password_hash").string().string_len(255).not_null())
                .col(ColumnDef::new("name").string().string_len(100).not_null())
                .col(
                    ColumnDef::new("role")
                        .string()
                        .string_len(20)
                        .not_null()
                        .default("user")
                        .extra("CHECK (role IN ('admin', 'user'))"),
                )
                .col(ColumnDef::new("active").boolean().not_null().default(true))
                .col(ColumnDef::new("login_attempts").integer().not_null().default(0))
                .col(ColumnDef::new("locked_until").timestamp_with_time_zone().null())
                .col(ColumnDef::new("last_login").timestamp_with_time_zone().null())
                .col(
                    ColumnDef::new("created_at")
                        .timestamp_with_time_zone()
                        .not_null()
                        .extra("DEFAULT NOW()"),
                )
                .col(
                    ColumnDef::new("updated_at")
                        .timestamp_with_time_zone()
                        .not_null()
                        .extra("DEFAULT NOW()"),
                )
                .to_owned(),
        );

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_users_active")
                .table("users")
                .col(Expr::col("active"))
                .to_owned(),
        );
    }
}
