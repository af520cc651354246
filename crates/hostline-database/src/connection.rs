//! Database connection management

use hostline_migrations::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub type DbConnection = DatabaseConnection;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    Connection(sea_orm::DbErr),

    #[error("Failed to run migrations: {0}")]
    Migration(sea_orm::DbErr),
}

/// Connect and bring the schema up to date
pub async fn establish_connection(database_url: &str) -> Result<Arc<DbConnection>, DatabaseError> {
    let mut opt = ConnectOptions::new(database_url);
    opt.max_connections(100)
        .min_connections(5)
        .sqlx_logging(false);

    debug!("Connecting to database");
    let db = Database::connect(opt)
        .await
        .map_err(DatabaseError::Connection)?;

    Migrator::up(&db, None)
        .await
        .map_err(DatabaseError::Migration)?;
    info!("Database connection established and migrations applied");

    Ok(Arc::new(db))
}
