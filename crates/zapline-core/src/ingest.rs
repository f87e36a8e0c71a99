//! Webhook ingestion pipeline
//!
//! The HTTP layer acknowledges provider deliveries immediately and hands the
//! raw body to [`IngestPipeline::process`] on a background task. Everything
//! after the ack is idempotent: replays of the same provider message id
//! insert nothing, count nothing, and trigger nothing.

use crate::errors::{CoreError, CoreResult};
use crate::forward::ExternalForwarder;
use crate::model::{
    ContactRecord, ConversationRecord, Direction, MessageKind, MessageRecord, MessageStatus,
    NewMessage, TenantRecord,
};
use crate::realtime::{RealtimeEvent, RealtimePublisher, Room};
use crate::store::{BroadcastStore, InboxStore, TenantStore};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zapline_whatsapp::webhook::verify_signature;
use zapline_whatsapp::{CloudApiClient, InboundMessage, MessageStatusUpdate, WebhookPayload};

/// How long after a broadcast send a reply still attributes to it.
const ATTRIBUTION_WINDOW_HOURS: i64 = 24;

/// Seam through which the ingester triggers the flow interpreter without
/// depending on it.
#[async_trait]
pub trait AutomationHook: Send + Sync {
    /// `message` is the raw provider payload; `record` is the persisted row
    /// (with any lazily resolved media URL).
    async fn handle_inbound(
        &self,
        tenant: &TenantRecord,
        contact: &ContactRecord,
        conversation: &ConversationRecord,
        message: &InboundMessage,
        record: &MessageRecord,
    ) -> CoreResult<()>;
}

/// Hook that does nothing; used when no chatbot is configured.
pub struct NoopAutomation;

#[async_trait]
impl AutomationHook for NoopAutomation {
    async fn handle_inbound(
        &self,
        _tenant: &TenantRecord,
        _contact: &ContactRecord,
        _conversation: &ConversationRecord,
        _message: &InboundMessage,
        _record: &MessageRecord,
    ) -> CoreResult<()> {
        Ok(())
    }
}

/// Keep only ASCII digits. Used to compare phone numbers whose formatting
/// (leading `+`, spaces) differs between the envelope and stored values.
pub fn digits_only(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Outcome counts for one processed envelope.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestSummary {
    pub messages_ingested: usize,
    pub duplicates: usize,
    pub self_messages_dropped: usize,
    pub statuses_advanced: usize,
    pub statuses_ignored: usize,
}

/// The webhook ingestion pipeline.
pub struct IngestPipeline {
    tenants: Arc<dyn TenantStore>,
    inbox: Arc<dyn InboxStore>,
    broadcasts: Arc<dyn BroadcastStore>,
    realtime: Arc<dyn RealtimePublisher>,
    provider: Arc<CloudApiClient>,
    forwarder: ExternalForwarder,
    automation: Arc<dyn AutomationHook>,
    /// Development mode accepts unsigned deliveries.
    dev_mode: bool,
}

impl IngestPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        inbox: Arc<dyn InboxStore>,
        broadcasts: Arc<dyn BroadcastStore>,
        realtime: Arc<dyn RealtimePublisher>,
        provider: Arc<CloudApiClient>,
        forwarder: ExternalForwarder,
        automation: Arc<dyn AutomationHook>,
        dev_mode: bool,
    ) -> Self {
        Self {
            tenants,
            inbox,
            broadcasts,
            realtime,
            provider,
            forwarder,
            automation,
            dev_mode,
        }
    }

    /// Process one raw webhook body. `tenant_hint` is the tenant named in
    /// the callback URL, when the tenant-addressed route was used.
    pub async fn process(
        &self,
        tenant_hint: Option<Uuid>,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> CoreResult<IngestSummary> {
        let body = std::str::from_utf8(raw_body)
            .map_err(|_| CoreError::validation("webhook body is not UTF-8"))?;
        let payload =
            WebhookPayload::parse(body).map_err(|e| CoreError::validation(e.to_string()))?;

        let Some(tenant) = self.resolve_tenant(tenant_hint, &payload).await? else {
            info!(
                phone_number_id = payload.phone_number_id().unwrap_or("<none>"),
                "webhook dropped: no matching active tenant"
            );
            return Ok(IngestSummary::default());
        };

        if !tenant.is_active() {
            info!(tenant = %tenant.id, "webhook dropped: subscription not active");
            return Ok(IngestSummary::default());
        }

        self.check_signature(&tenant, raw_body, signature)?;

        let mut summary = IngestSummary::default();
        for (metadata, contact, message) in payload.messages() {
            // Loop prevention: a flow can notify the tenant's own line, and
            // the provider will echo it back as an inbound message.
            if digits_only(&message.from) == digits_only(&metadata.display_phone_number) {
                debug!(tenant = %tenant.id, "self message dropped");
                summary.self_messages_dropped += 1;
                continue;
            }
            let profile_name = contact
                .and_then(|c| c.profile.as_ref())
                .and_then(|p| p.name.as_deref());
            match self
                .process_message(&tenant, profile_name, message, &mut summary)
                .await
            {
                Ok(()) => {}
                Err(err) => {
                    warn!(
                        tenant = %tenant.id,
                        wamid = %message.id,
                        "message ingestion failed: {err}"
                    );
                }
            }
        }
        for (_, status) in payload.statuses() {
            if let Err(err) = self.process_status(&tenant, status, &mut summary).await {
                warn!(
                    tenant = %tenant.id,
                    wamid = %status.id,
                    "status ingestion failed: {err}"
                );
            }
        }

        Ok(summary)
    }

    async fn resolve_tenant(
        &self,
        tenant_hint: Option<Uuid>,
        payload: &WebhookPayload,
    ) -> CoreResult<Option<TenantRecord>> {
        if let Some(id) = tenant_hint {
            return self.tenants.by_id(id).await;
        }
        let Some(phone_number_id) = payload.phone_number_id() else {
            return Ok(None);
        };
        self.tenants.by_phone_number_id(phone_number_id).await
    }

    fn check_signature(
        &self,
        tenant: &TenantRecord,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> CoreResult<()> {
        match signature {
            Some(header) => verify_signature(&tenant.access_token, raw_body, header)
                .map_err(|e| CoreError::auth(e.to_string())),
            None if self.dev_mode => Ok(()),
            None => Err(CoreError::auth("missing X-Hub-Signature-256 header")),
        }
    }

    async fn process_message(
        &self,
        tenant: &TenantRecord,
        profile_name: Option<&str>,
        message: &InboundMessage,
        summary: &mut IngestSummary,
    ) -> CoreResult<()> {
        // 1. Contact, lazily created on first inbound message.
        let contact = self
            .inbox
            .upsert_contact(tenant.id, &message.from, &message.from, profile_name)
            .await?;

        // 2. One live conversation per contact.
        let existing = self
            .inbox
            .find_live_conversation(tenant.id, contact.id)
            .await?;
        let is_new_conversation = existing.is_none();
        let mut conversation = match existing {
            Some(conversation) => conversation,
            None => self.inbox.open_conversation(tenant.id, contact.id).await?,
        };

        // 3. Broadcast attribution on first reply after a recent broadcast.
        if conversation.broadcast_id.is_none() {
            let recent = self
                .broadcasts
                .recent_broadcast_for_phone(
                    tenant.id,
                    &contact.phone,
                    Duration::hours(ATTRIBUTION_WINDOW_HOURS),
                )
                .await?;
            if let Some(broadcast) = recent {
                if self
                    .inbox
                    .attribute_broadcast(conversation.id, broadcast.id)
                    .await?
                {
                    self.broadcasts.increment_replied(broadcast.id).await?;
                    conversation.broadcast_id = Some(broadcast.id);
                }
            }
        }

        // 4. Lazy media URL resolution for downloadable kinds.
        let kind = MessageKind::from_provider(&message.message_type);
        let media = message.media();
        let mut media_url = None;
        if kind.has_media() {
            if let Some(media_id) = media.and_then(|m| m.id.as_deref()) {
                match self.provider.media_url(&tenant.credentials(), media_id).await {
                    Ok(info) => media_url = Some(info.url),
                    Err(err) => {
                        warn!(tenant = %tenant.id, media_id, "media url lookup failed: {err}")
                    }
                }
            }
        }

        // 5. Idempotent insert keyed on the provider message id.
        let sent_at = message
            .timestamp
            .parse::<i64>()
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_else(Utc::now);
        let body = message.text_body().unwrap_or_default();
        let preview = if body.is_empty() {
            format!("[{}]", kind.as_str())
        } else {
            body.clone()
        };
        let outcome = self
            .inbox
            .insert_incoming(NewMessage {
                tenant_id: tenant.id,
                conversation_id: conversation.id,
                direction: Direction::In,
                kind,
                body,
                caption: media.and_then(|m| m.caption.clone()),
                media_url,
                media_id: media.and_then(|m| m.id.clone()),
                media_mime: media.and_then(|m| m.mime_type.clone()),
                media_size: None,
                filename: media.and_then(|m| m.filename.clone()),
                status: MessageStatus::Delivered,
                provider_message_id: Some(message.id.clone()),
                sent_at,
            })
            .await?;
        let record = match outcome {
            crate::model::InsertOutcome::Inserted(record) => record,
            crate::model::InsertOutcome::Duplicate => {
                debug!(tenant = %tenant.id, wamid = %message.id, "duplicate delivery dropped");
                summary.duplicates += 1;
                return Ok(());
            }
        };
        summary.messages_ingested += 1;

        // 6. Conversation preview, last-message time, unread counter.
        self.inbox
            .touch_conversation_incoming(conversation.id, &preview, sent_at)
            .await?;

        // 7. Realtime fan-out to the tenant room (and conversation room).
        if is_new_conversation {
            self.realtime.publish(
                Room::Org(tenant.id),
                RealtimeEvent::NewConversation {
                    conversation_id: conversation.id,
                    contact_id: contact.id,
                },
            );
        }
        let event = RealtimeEvent::NewMessage {
            conversation_id: conversation.id,
            message_id: record.id,
            direction: Direction::In.as_str().to_string(),
            preview,
        };
        self.realtime.publish(Room::Org(tenant.id), event.clone());
        self.realtime
            .publish(Room::Conversation(conversation.id), event);

        // 8. Mirror to the tenant's own webhook, signed with their secret.
        if let Some(url) = &tenant.external_webhook_url {
            let payload = json!({
                "type": "message",
                "data": {
                    "id": record.id,
                    "provider_message_id": record.provider_message_id,
                    "conversation_id": record.conversation_id,
                    "direction": record.direction.as_str(),
                    "kind": record.kind.as_str(),
                    "body": record.body,
                    "media_url": record.media_url,
                    "timestamp": record.sent_at,
                },
                "contact": {
                    "id": contact.id,
                    "phone": contact.phone,
                    "name": contact.display_name(),
                },
            });
            if let Err(err) = self
                .forwarder
                .forward(url, tenant.external_webhook_secret.as_deref(), &payload)
                .await
            {
                warn!(tenant = %tenant.id, "external forward failed: {err}");
            }
        }

        // 9. Trigger the interpreter, unless the attributed broadcast opted
        // its replies out of the chatbot.
        let mut run_automation = true;
        if let Some(broadcast_id) = conversation.broadcast_id {
            if let Some(broadcast) = self.broadcasts.get(tenant.id, broadcast_id).await? {
                run_automation = broadcast.chatbot_enabled;
            }
        }
        if run_automation {
            if let Err(err) = self
                .automation
                .handle_inbound(tenant, &contact, &conversation, message, &record)
                .await
            {
                warn!(
                    tenant = %tenant.id,
                    conversation = %conversation.id,
                    "automation failed: {err}"
                );
            }
        }

        Ok(())
    }

    async fn process_status(
        &self,
        tenant: &TenantRecord,
        status: &MessageStatusUpdate,
        summary: &mut IngestSummary,
    ) -> CoreResult<()> {
        let new_status = MessageStatus::from_provider(status.status);
        let error_text = status.error_text();

        let advanced = self
            .inbox
            .apply_status(tenant.id, &status.id, new_status, error_text.as_deref())
            .await?;
        match &advanced {
            Some(record) => {
                summary.statuses_advanced += 1;
                let event = RealtimeEvent::MessageStatus {
                    conversation_id: record.conversation_id,
                    message_id: record.id,
                    provider_message_id: status.id.clone(),
                    status: new_status,
                };
                self.realtime.publish(Room::Org(tenant.id), event.clone());
                self.realtime
                    .publish(Room::Conversation(record.conversation_id), event);

                if let Some(url) = &tenant.external_webhook_url {
                    let payload = json!({
                        "type": "status",
                        "data": {
                            "provider_message_id": status.id,
                            "status": new_status.as_str(),
                            "recipient_id": status.recipient_id,
                            "error": error_text,
                        },
                    });
                    if let Err(err) = self
                        .forwarder
                        .forward(url, tenant.external_webhook_secret.as_deref(), &payload)
                        .await
                    {
                        warn!(tenant = %tenant.id, "external forward failed: {err}");
                    }
                }
            }
            None => {
                summary.statuses_ignored += 1;
            }
        }

        // Broadcast reconciliation: recipient status + aggregate counters.
        if let Some((recipient, broadcast)) = self
            .broadcasts
            .find_recipient_by_provider_id(tenant.id, &status.id)
            .await?
        {
            let advanced = self
                .broadcasts
                .advance_recipient_status(recipient.id, new_status, error_text.as_deref())
                .await?;
            if advanced {
                if let Some(updated) = self.broadcasts.get(tenant.id, broadcast.id).await? {
                    self.realtime.publish(
                        Room::Org(tenant.id),
                        RealtimeEvent::BroadcastStatusUpdate {
                            broadcast_id: updated.id,
                            status: updated.status.as_str().to_string(),
                            counters: updated.counters,
                        },
                    );
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digits_only_strips_formatting() {
        assert_eq!(digits_only("+91 12345-00001"), "911234500001");
        assert_eq!(digits_only("911234500001"), "911234500001");
        assert_eq!(digits_only(""), "");
    }
}
