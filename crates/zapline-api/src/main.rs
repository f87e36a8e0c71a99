//! Zapline API server

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zapline_api::{routes, workers, AppState, Config};
use zapline_db::{establish_connection, Migrator, MigratorTrait};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;
    let port = config.port;
    let cors_origins = config.cors_origins.clone();

    let db = Arc::new(establish_connection(&config.database_url).await?);
    Migrator::up(db.as_ref(), None).await?;
    info!("migrations applied");

    let state = AppState::build(config, db)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_state = state.clone();
    tokio::spawn(workers::scheduler_worker::run(worker_state, shutdown_rx));

    info!(port, "zapline-api listening");
    let app_state = web::Data::new(state);
    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            .allowed_methods(["GET", "POST", "PUT", "DELETE"])
            .allow_any_header()
            .max_age(3600);
        if cors_origins.is_empty() {
            cors = cors.allow_any_origin();
        } else {
            for origin in &cors_origins {
                cors = cors.allowed_origin(origin);
            }
        }
        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .configure(routes::configure)
    })
    .bind(("0.0.0.0", port))?
    .run();

    let result = server.await;
    // Drain in-flight work before the pools drop.
    let _ = shutdown_tx.send(true);
    result?;
    Ok(())
}
