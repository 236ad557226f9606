//! Migration system
//!
//! - [`Migration`] trait: a versioned list of schema statements
//! - [`SchemaManager`] collecting those statements (`sea-query` or raw SQL)
//! - state tracking in `cashdesk_migrations` with SHA-256 checksums
//! - [`Migrator`] applying pending migrations under a PostgreSQL advisory lock
//!
//! # Example
//!
//! ```rust
//! use cashdesk::migration::{Migration, SchemaManager};
//! use sea_query::{ColumnDef, Table};
//!
//! pub struct CreateSectionsTable;
//!
//! impl Migration for CreateSectionsTable {
//!     fn name(&self) -> &str {
//!         "create_sections_table"
//!     }
//!
//!     fn version(&self) -> i64 {
//!         20240120120000
//!     }
//!
//!     fn up(&self, manager: &mut SchemaManager) {
//!         manager.create_table(
//!             Table::create()
//!                 .table("sections")
//!                 .if_not_exists()
//!                 .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
//!                 .col(ColumnDef::new("name").string().not_null().unique_key())
//!                 .to_owned(),
//!         );
//!     }
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod lock;
pub mod migration;
pub mod migrator;
pub mod record;
pub mod schema_manager;
pub mod state_table;
pub mod status;

pub use checksum::calculate_checksum;
pub use error::MigrationError;
pub use migration::Migration;
pub use migrator::Migrator;
pub use record::MigrationRecord;
pub use schema_manager::SchemaManager;
pub use state_table::initialize_state_table;
pub use status::{MigrationStatus, PendingMigration};
