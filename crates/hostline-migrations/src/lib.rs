//! Database migrations for the Hostline verification engine

pub use sea_orm_migration::prelude::*;

mod migration;
pub use migration::Migrator;
