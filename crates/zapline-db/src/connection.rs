//! Database connection setup

use crate::error::{DatabaseError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Open a connection pool against the configured database URL.
pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(database_url.to_string());
    options
        .max_connections(20)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(300))
        .sqlx_logging(false);

    let connection = Database::connect(options)
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))?;
    info!("database connection established");
    Ok(connection)
}
