//! Outbound send path
//!
//! Every outgoing message — interpreter, operator, or API send — goes
//! through [`OutboundMessenger`]: provider send, inbox record, conversation
//! preview, realtime event. The [`MessageSender`] seam lets tests swap the
//! provider call for a recording fake.

use crate::errors::CoreResult;
use crate::model::{
    ContactRecord, Direction, MessageKind, MessageRecord, MessageStatus, NewMessage, TenantRecord,
};
use crate::realtime::{RealtimeEvent, RealtimePublisher, Room};
use crate::store::InboxStore;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use zapline_whatsapp::{CloudApiClient, MessageEnvelope, SendOutcome};

/// Seam over the provider client's send call.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(
        &self,
        tenant: &TenantRecord,
        to: &str,
        envelope: &MessageEnvelope,
    ) -> CoreResult<SendOutcome>;
}

/// Production sender backed by the Cloud API client.
pub struct ProviderSender {
    client: Arc<CloudApiClient>,
}

impl ProviderSender {
    pub fn new(client: Arc<CloudApiClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageSender for ProviderSender {
    async fn send(
        &self,
        tenant: &TenantRecord,
        to: &str,
        envelope: &MessageEnvelope,
    ) -> CoreResult<SendOutcome> {
        let outcome = self
            .client
            .send(&tenant.credentials(), to, envelope)
            .await?;
        Ok(outcome)
    }
}

/// Send a message and record it against a conversation.
pub struct OutboundMessenger {
    sender: Arc<dyn MessageSender>,
    inbox: Arc<dyn InboxStore>,
    realtime: Arc<dyn RealtimePublisher>,
}

impl OutboundMessenger {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        inbox: Arc<dyn InboxStore>,
        realtime: Arc<dyn RealtimePublisher>,
    ) -> Self {
        Self {
            sender,
            inbox,
            realtime,
        }
    }

    /// Provider send followed by the inbox write and realtime fan-out.
    /// The provider call happens first; a failed send records nothing.
    pub async fn send_to_conversation(
        &self,
        tenant: &TenantRecord,
        contact: &ContactRecord,
        conversation_id: Uuid,
        envelope: &MessageEnvelope,
    ) -> CoreResult<MessageRecord> {
        let outcome = self.sender.send(tenant, &contact.phone, envelope).await?;
        debug!(
            wamid = %outcome.provider_message_id,
            conversation = %conversation_id,
            "message sent"
        );

        let preview = envelope.preview();
        let now = Utc::now();
        let record = self
            .inbox
            .record_outgoing(NewMessage {
                tenant_id: tenant.id,
                conversation_id,
                direction: Direction::Out,
                kind: envelope_kind(envelope),
                body: preview.clone(),
                caption: envelope_caption(envelope),
                media_url: envelope_media_url(envelope),
                media_id: envelope_media_id(envelope),
                media_mime: None,
                media_size: None,
                filename: envelope_filename(envelope),
                status: MessageStatus::Sent,
                provider_message_id: Some(outcome.provider_message_id.clone()),
                sent_at: now,
            })
            .await?;

        self.inbox
            .touch_conversation_outgoing(conversation_id, &preview, now)
            .await?;

        self.realtime.publish(
            Room::Org(tenant.id),
            RealtimeEvent::NewMessage {
                conversation_id,
                message_id: record.id,
                direction: Direction::Out.as_str().to_string(),
                preview: preview.clone(),
            },
        );
        self.realtime.publish(
            Room::Conversation(conversation_id),
            RealtimeEvent::NewMessage {
                conversation_id,
                message_id: record.id,
                direction: Direction::Out.as_str().to_string(),
                preview,
            },
        );

        Ok(record)
    }

    /// Bare provider send for recipients without a conversation (external
    /// sends, broadcast recipients).
    pub async fn send_raw(
        &self,
        tenant: &TenantRecord,
        to: &str,
        envelope: &MessageEnvelope,
    ) -> CoreResult<SendOutcome> {
        self.sender.send(tenant, to, envelope).await
    }
}

fn envelope_kind(envelope: &MessageEnvelope) -> MessageKind {
    MessageKind::from_provider(envelope.kind())
}

fn envelope_caption(envelope: &MessageEnvelope) -> Option<String> {
    match envelope {
        MessageEnvelope::Image { caption, .. }
        | MessageEnvelope::Video { caption, .. }
        | MessageEnvelope::Document { caption, .. } => caption.clone(),
        _ => None,
    }
}

fn envelope_media_url(envelope: &MessageEnvelope) -> Option<String> {
    match envelope {
        MessageEnvelope::Image { media, .. }
        | MessageEnvelope::Video { media, .. }
        | MessageEnvelope::Audio { media }
        | MessageEnvelope::Document { media, .. } => match media {
            zapline_whatsapp::MediaRef::Link(url) => Some(url.clone()),
            zapline_whatsapp::MediaRef::Id(_) => None,
        },
        _ => None,
    }
}

fn envelope_media_id(envelope: &MessageEnvelope) -> Option<String> {
    match envelope {
        MessageEnvelope::Image { media, .. }
        | MessageEnvelope::Video { media, .. }
        | MessageEnvelope::Audio { media }
        | MessageEnvelope::Document { media, .. } => match media {
            zapline_whatsapp::MediaRef::Link(_) => None,
            zapline_whatsapp::MediaRef::Id(id) => Some(id.clone()),
        },
        _ => None,
    }
}

fn envelope_filename(envelope: &MessageEnvelope) -> Option<String> {
    match envelope {
        MessageEnvelope::Document { filename, .. } => filename.clone(),
        _ => None,
    }
}
