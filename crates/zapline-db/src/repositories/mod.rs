//! Store-contract implementations over SeaORM
//!
//! [`PgStore`] implements every trait in `zapline_core::store`. Counter and
//! status updates are expressed as conditional `UPDATE ... WHERE` statements
//! so concurrent webhook deliveries cannot double-count or downgrade; the
//! row lock taken by the update is the per-conversation serialization the
//! concurrency model requires.

mod broadcast;
mod catalog;
mod flow;
mod inbox;
mod notification;
mod session;
mod sql;
mod tenant;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// One store over one connection pool, serving every tenant.
#[derive(Clone)]
pub struct PgStore {
    db: Arc<DatabaseConnection>,
}

impl PgStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}
