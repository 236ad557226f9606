//! Migration trait definition

use super::schema_manager::SchemaManager;

/// Trait that all migrations must implement
///
/// A migration describes its schema changes by pushing statements onto a
/// [`SchemaManager`]. The migrator runs the collected statements inside one transaction and
/// checksums them, so an applied migration that is later edited is detected.
pub trait Migration: Send + Sync {
    /// Get the migration name (human-readable identifier)
    fn name(&self) -> &str;

    /// Get the migration version (timestamp: YYYYMMDDHHMMSS)
    fn version(&self) -> i64;

    /// Describe the forward migration.
    fn up(&self, manager: &mut SchemaManager);
}
