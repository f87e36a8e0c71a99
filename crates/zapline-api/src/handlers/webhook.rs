//! Provider webhook endpoints
//!
//! `GET /webhook[/{tenant}]` answers the verification handshake.
//! `POST /webhook[/{tenant}]` acknowledges with 200 immediately and hands
//! the raw body to the ingest pipeline on a background task — the provider
//! retries non-200 responses, and the pipeline is idempotent, so the ack
//! must never wait on processing.

use crate::middleware::{ApiError, ApiResult};
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use tracing::{info, warn};
use uuid::Uuid;
use zapline_core::store::TenantStore;
use zapline_whatsapp::WebhookChallenge;

fn signature_header(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("x-hub-signature-256")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// Verification handshake on the legacy single-tenant route.
pub async fn verify_legacy(
    query: web::Query<WebhookChallenge>,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let Some(expected) = state.config.default_verify_token.as_deref() else {
        return Err(ApiError::Forbidden);
    };
    match query.verify(expected) {
        Ok(challenge) => Ok(HttpResponse::Ok().body(challenge.to_string())),
        Err(err) => {
            warn!("webhook verification failed: {err}");
            Err(ApiError::Forbidden)
        }
    }
}

/// Verification handshake on the tenant-addressed route.
pub async fn verify_tenant(
    path: web::Path<Uuid>,
    query: web::Query<WebhookChallenge>,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let tenant_id = path.into_inner();
    let tenant = state
        .store
        .by_id(tenant_id)
        .await
        .map_err(ApiError::from)?
        .ok_or_else(|| ApiError::NotFound(format!("organization {tenant_id}")))?;

    match query.verify(&tenant.verify_token) {
        Ok(challenge) => {
            info!(tenant = %tenant_id, "webhook verified");
            Ok(HttpResponse::Ok().body(challenge.to_string()))
        }
        Err(err) => {
            warn!(tenant = %tenant_id, "webhook verification failed: {err}");
            Err(ApiError::Forbidden)
        }
    }
}

/// Delivery on the legacy route: tenant resolved from the envelope.
pub async fn receive_legacy(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    ingest_in_background(state, None, body, signature_header(&req));
    HttpResponse::Ok().finish()
}

/// Delivery on the tenant-addressed route.
pub async fn receive_tenant(
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    ingest_in_background(state, Some(path.into_inner()), body, signature_header(&req));
    HttpResponse::Ok().finish()
}

fn ingest_in_background(
    state: web::Data<AppState>,
    tenant_hint: Option<Uuid>,
    body: web::Bytes,
    signature: Option<String>,
) {
    tokio::spawn(async move {
        match state
            .pipeline
            .process(tenant_hint, &body, signature.as_deref())
            .await
        {
            Ok(summary) => {
                if summary.messages_ingested > 0 || summary.statuses_advanced > 0 {
                    info!(
                        messages = summary.messages_ingested,
                        duplicates = summary.duplicates,
                        statuses = summary.statuses_advanced,
                        "webhook processed"
                    );
                }
            }
            // The provider already got its 200; errors are only logged.
            Err(err) => warn!("webhook processing failed: {err}"),
        }
    });
}
