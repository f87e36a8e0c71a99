//! Route table

use crate::handlers::{health, integrations, realtime, webhook};
use actix_web::web;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health::health))
        // Provider webhook: legacy single-tenant and tenant-addressed.
        .route("/webhook", web::get().to(webhook::verify_legacy))
        .route("/webhook", web::post().to(webhook::receive_legacy))
        .route("/webhook/{tenant}", web::get().to(webhook::verify_tenant))
        .route("/webhook/{tenant}", web::post().to(webhook::receive_tenant))
        // External send surface.
        .route("/integrations/send", web::post().to(integrations::send_text))
        .route(
            "/integrations/send-template",
            web::post().to(integrations::send_template),
        )
        // Realtime handshake.
        .route("/ws", web::get().to(realtime::handshake));
}
