//! Test utilities for database integration tests
//!
//! Every [`TestDatabase`] is a private in-memory SQLite database with the full
//! schema applied, so tests never share state.

use crate::DbConnection;
use hostline_migrations::Migrator;
use sea_orm::{ConnectionTrait, Database, DatabaseBackend, ExecResult, Statement};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

pub struct TestDatabase {
    pub db: Arc<DbConnection>,
}

impl TestDatabase {
    /// Fresh in-memory database without any tables
    pub async fn new() -> anyhow::Result<Self> {
        // A single pooled connection keeps every query on the same in-memory database
        let db = Database::connect("sqlite::memory:")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create test database: {}", e))?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Fresh in-memory database with all migrations applied
    pub async fn with_migrations() -> anyhow::Result<Self> {
        let test_db = Self::new().await?;
        Migrator::up(test_db.db.as_ref(), None)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
        Ok(test_db)
    }

    pub async fn execute_sql(&self, sql: &str) -> anyhow::Result<ExecResult> {
        let statement = Statement::from_string(DatabaseBackend::Sqlite, sql.to_owned());
        Ok(self.db.execute(statement).await?)
    }

    /// Get the database connection as Arc
    pub fn connection_arc(&self) -> Arc<DbConnection> {
        Arc::clone(&self.db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_setup() -> anyhow::Result<()> {
        let test_db = TestDatabase::with_migrations().await?;

        test_db
            .execute_sql("INSERT INTO instances (name, environment, account_portal_enabled, uses_shared_mail_domain, created_at, updated_at) VALUES ('acme', 'production', 1, 0, '2025-01-01T00:00:00Z', '2025-01-01T00:00:00Z')")
            .await?;

        let rows = test_db
            .db
            .query_all(Statement::from_string(
                DatabaseBackend::Sqlite,
                "SELECT id FROM instances".to_owned(),
            ))
            .await?;
        assert_eq!(rows.len(), 1);

        Ok(())
    }
}
