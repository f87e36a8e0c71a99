//! HTTP surface for Zapline
//!
//! Routes: the provider webhook (verification + delivery), the API-key
//! authenticated send surface, the realtime websocket handshake, and a
//! health endpoint. Operator CRUD surfaces are external collaborators; they
//! consume the store contracts, not this crate.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod workers;

pub use config::Config;
pub use state::AppState;
