//! Entity models
//!
//! One module per table. Status-like columns are stored as strings; the
//! typed enums live in `zapline-core` and each model converts through its
//! `to_record()` helper.

pub mod broadcast;
pub mod broadcast_recipient;
pub mod contact;
pub mod conversation;
pub mod flow;
pub mod flow_session;
pub mod message;
pub mod organization;
pub mod quick_reply;
pub mod scheduled_notification;
pub mod template;
