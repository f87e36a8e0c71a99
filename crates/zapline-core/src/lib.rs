//! Core domain logic for Zapline
//!
//! This crate holds everything the webhook ingester, flow interpreter, and
//! broadcast dispatcher share: the tenant-scoped store contracts, the domain
//! records those contracts speak, the realtime publication surface, and the
//! ingestion/dispatch/scheduling services themselves. Persistence lives in
//! `zapline-db`; the interpreter lives in `zapline-flow`; both plug in
//! through the traits defined here.

pub mod broadcast;
pub mod errors;
pub mod forward;
pub mod ingest;
pub mod model;
pub mod outbound;
pub mod realtime;
pub mod scheduler;
pub mod store;

pub use errors::{CoreError, CoreResult};
