//! Request middleware: error mapping and authentication helpers

pub mod auth;
pub mod error_handler;

pub use auth::{validate_bearer, Claims};
pub use error_handler::{ApiError, ApiResult};
