//! Health endpoint

use actix_web::HttpResponse;
use serde_json::json;

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "service": "zapline-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
