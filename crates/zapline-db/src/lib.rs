//! Relational persistence for Zapline
//!
//! SeaORM entities and the [`PgStore`] implementation of every store
//! contract in `zapline-core`. One `PgStore` wraps one connection pool and
//! serves all tenants; every query carries tenant scope.

pub mod connection;
pub mod entities;
pub mod error;
pub mod migration;
pub mod repositories;

pub use connection::establish_connection;
pub use error::{DatabaseError, Result};
pub use migration::Migrator;
pub use repositories::PgStore;

// Re-exported so binaries can run migrations without their own
// sea-orm-migration dependency.
pub use sea_orm_migration::MigratorTrait;
