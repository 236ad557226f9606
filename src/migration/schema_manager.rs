//! SchemaManager - collects the schema statements of a migration

use crate::executor::{Executor, StoreError};
use sea_query::{IndexCreateStatement, PostgresQueryBuilder, TableCreateStatement};

/// Ordered list of DDL statements making up one migration.
///
/// Tables and plain indexes are built with `sea-query`; anything it cannot express
/// (partial indexes, descending keys) goes through [`SchemaManager::raw`].
#[derive(Debug, Default, Clone)]
pub struct SchemaManager {
    statements: Vec<String>,
}

impl SchemaManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table
    ///
    /// # Example
    /// ```rust
    /// use cashdesk::migration::SchemaManager;
    /// use sea_query::{ColumnDef, Table};
    ///
    /// let mut manager = SchemaManager::new();
    /// manager.create_table(
    ///     Table::create()
    ///         .table("sections")
    ///         .if_not_exists()
    ///         .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
    ///         .to_owned(),
    /// );
    /// assert_eq!(manager.statements().len(), 1);
    /// ```
    pub fn create_table(&mut self, table: TableCreateStatement) -> &mut Self {
        self.statements.push(table.build(PostgresQueryBuilder));
        self
    }

    /// Create an index
    pub fn create_index(&mut self, index: IndexCreateStatement) -> &mut Self {
        self.statements.push(index.build(PostgresQueryBuilder));
        self
    }

    /// Add a raw SQL statement
    pub fn raw(&mut self, sql: impl Into<String>) -> &mut Self {
        self.statements.push(sql.into());
        self
    }

    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    /// Run every collected statement in order on `executor`.
    pub fn apply(&self, executor: &dyn Executor) -> Result<(), StoreError> {
        for sql in &self.statements {
            executor.execute(sql, &[])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{ColumnDef, Expr, Index, Table};

    #[test]
    fn test_builds_postgres_ddl() {
        let mut manager = SchemaManager::new();
        manager
            .create_table(
                Table::create()
                    .table("sections")
                    .if_not_exists()
                    .col(
                        ColumnDef::new("id")
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new("name").string().string_len(100).not_null())
                    .to_owned(),
            )
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_sections_name")
                    .table("sections")
                    .col(Expr::col("name"))
                    .to_owned(),
            )
            .raw("COMMENT ON TABLE sections IS 'ledger sections'");

        let statements = manager.statements();
        assert_eq!(statements.len(), 3);
        assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS \"sections\""));
        assert!(statements[0].contains("\"name\" varchar(100) NOT NULL"));
        assert!(statements[1].contains("\"idx_sections_name\""));
        assert!(statements[2].starts_with("COMMENT ON TABLE"));
    }
}
