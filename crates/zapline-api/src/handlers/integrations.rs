//! External send surface (API-key authenticated)
//!
//! `POST /integrations/send` and `POST /integrations/send-template` let a
//! tenant's own systems push messages through their WhatsApp line. The key
//! travels in `X-API-Key`; every send is recorded in the inbox like any
//! other outgoing message.

use crate::middleware::{ApiError, ApiResult};
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use validator::Validate;
use zapline_core::ingest::digits_only;
use zapline_core::model::TenantRecord;
use zapline_core::store::InboxStore;
use zapline_whatsapp::{CloudApiClient, MessageEnvelope, TemplateMessage};

#[derive(Debug, Deserialize, Validate)]
pub struct SendTextRequest {
    #[validate(length(min = 8, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 4096))]
    pub message: String,
    #[serde(default)]
    pub preview_url: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendTemplateRequest {
    #[validate(length(min = 8, max = 20))]
    pub phone: String,
    #[validate(length(min = 1))]
    pub template_name: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub header_media_id: Option<String>,
    #[serde(default)]
    pub header_media_type: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

async fn authenticate(req: &HttpRequest, state: &AppState) -> ApiResult<TenantRecord> {
    let key = req
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    let tenant = state
        .store
        .tenant_by_api_key(key)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::Unauthorized)?;
    if !tenant.is_active() {
        return Err(ApiError::TenantClosed);
    }
    Ok(tenant)
}

async fn send_recorded(
    state: &AppState,
    tenant: &TenantRecord,
    phone: &str,
    envelope: MessageEnvelope,
) -> ApiResult<HttpResponse> {
    let digits = digits_only(phone);
    if digits.len() < 8 {
        return Err(ApiError::validation("phone must carry a country code"));
    }
    let contact = state
        .store
        .upsert_contact(tenant.id, &digits, &digits, None)
        .await
        .map_err(ApiError::from)?;
    let conversation = state
        .store
        .open_conversation(tenant.id, contact.id)
        .await
        .map_err(ApiError::from)?;

    let record = state
        .outbound
        .send_to_conversation(tenant, &contact, conversation.id, &envelope)
        .await
        .map_err(ApiError::from)?;

    Ok(HttpResponse::Ok().json(json!({
        "message_id": record.id,
        "provider_message_id": record.provider_message_id,
        "conversation_id": conversation.id,
        "status": record.status,
    })))
}

pub async fn send_text(
    req: HttpRequest,
    body: web::Json<SendTextRequest>,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let tenant = authenticate(&req, &state).await?;
    let envelope = MessageEnvelope::Text {
        body: body.message.clone(),
        preview_url: body.preview_url,
    };
    send_recorded(&state, &tenant, &body.phone, envelope).await
}

pub async fn send_template(
    req: HttpRequest,
    body: web::Json<SendTemplateRequest>,
    state: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let tenant = authenticate(&req, &state).await?;

    let header = body
        .header_media_type
        .as_deref()
        .zip(body.header_media_id.as_deref());
    let components = CloudApiClient::broadcast_components(header, &body.variables);
    let envelope = MessageEnvelope::Template {
        template: TemplateMessage::new(body.template_name.clone(), body.language.clone())
            .with_components(components),
    };
    send_recorded(&state, &tenant, &body.phone, envelope).await
}
