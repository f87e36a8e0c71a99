//! Broadcast dispatcher
//!
//! Sends a broadcast's template to its recipient list in bounded batches.
//! `start` is idempotent: only a broadcast in `pending` or `scheduled` moves
//! to `processing`, so replays and double-wakeups are no-ops. Cancellation
//! is honored between batches; an in-flight batch always completes.

use crate::errors::{CoreError, CoreResult};
use crate::model::{BroadcastRecipientRecord, BroadcastStatus, TenantRecord};
use crate::outbound::MessageSender;
use crate::realtime::{RealtimeEvent, RealtimePublisher, Room};
use crate::store::{BroadcastStore, InboxStore, TenantStore};
use chrono::Utc;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use zapline_whatsapp::{CloudApiClient, MessageEnvelope, TemplateMessage};

const BATCH_SIZE: usize = 50;
const BATCH_PAUSE: Duration = Duration::from_secs(5);

pub struct BroadcastDispatcher {
    tenants: Arc<dyn TenantStore>,
    broadcasts: Arc<dyn BroadcastStore>,
    inbox: Arc<dyn InboxStore>,
    sender: Arc<dyn MessageSender>,
    realtime: Arc<dyn RealtimePublisher>,
    batch_size: usize,
    batch_pause: Duration,
}

impl BroadcastDispatcher {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        broadcasts: Arc<dyn BroadcastStore>,
        inbox: Arc<dyn InboxStore>,
        sender: Arc<dyn MessageSender>,
        realtime: Arc<dyn RealtimePublisher>,
    ) -> Self {
        Self {
            tenants,
            broadcasts,
            inbox,
            sender,
            realtime,
            batch_size: BATCH_SIZE,
            batch_pause: BATCH_PAUSE,
        }
    }

    /// Shrink batching for tests.
    pub fn with_batching(mut self, batch_size: usize, batch_pause: Duration) -> Self {
        self.batch_size = batch_size.max(1);
        self.batch_pause = batch_pause;
        self
    }

    /// Run a broadcast to completion. Returns without effect unless the
    /// broadcast is currently `pending` or `scheduled`.
    pub async fn start(&self, tenant_id: Uuid, broadcast_id: Uuid) -> CoreResult<()> {
        let claimed = self
            .broadcasts
            .transition(
                broadcast_id,
                &[BroadcastStatus::Pending, BroadcastStatus::Scheduled],
                BroadcastStatus::Processing,
                Utc::now(),
            )
            .await?;
        if !claimed {
            info!(broadcast = %broadcast_id, "broadcast not startable, skipping");
            return Ok(());
        }

        let Some(broadcast) = self.broadcasts.get(tenant_id, broadcast_id).await? else {
            return Err(CoreError::not_found(
                "broadcast".to_string(),
                broadcast_id.to_string(),
            ));
        };
        let Some(tenant) = self.tenants.by_id(tenant_id).await? else {
            self.broadcasts
                .transition(
                    broadcast_id,
                    &[BroadcastStatus::Processing],
                    BroadcastStatus::Failed,
                    Utc::now(),
                )
                .await?;
            return Err(CoreError::not_found(
                "organization".to_string(),
                tenant_id.to_string(),
            ));
        };

        let header = broadcast
            .header_media_type
            .as_deref()
            .zip(broadcast.header_media_id.as_deref());

        // Recipients that already carry an outcome are skipped, so a restart
        // resumes where the previous run stopped.
        let recipients: Vec<BroadcastRecipientRecord> = self
            .broadcasts
            .recipients(broadcast_id)
            .await?
            .into_iter()
            .filter(|r| r.provider_message_id.is_none() && r.error.is_none())
            .collect();

        info!(
            broadcast = %broadcast_id,
            tenant = %tenant_id,
            recipients = recipients.len(),
            "broadcast processing started"
        );

        let mut batches = recipients.chunks(self.batch_size).peekable();
        while let Some(batch) = batches.next() {
            // Cancellation is checked at the batch boundary only.
            if self.broadcasts.status(broadcast_id).await? != Some(BroadcastStatus::Processing) {
                info!(broadcast = %broadcast_id, "broadcast no longer processing, stopping");
                return Ok(());
            }

            let sends = batch.iter().map(|recipient| {
                self.send_to_recipient(&tenant, &broadcast.template_name, &broadcast.template_language, header, recipient)
            });
            join_all(sends).await;

            self.publish_progress(&tenant, broadcast_id).await?;

            if batches.peek().is_some() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        self.broadcasts
            .transition(
                broadcast_id,
                &[BroadcastStatus::Processing],
                BroadcastStatus::Completed,
                Utc::now(),
            )
            .await?;
        self.publish_progress(&tenant, broadcast_id).await?;
        info!(broadcast = %broadcast_id, "broadcast completed");

        Ok(())
    }

    async fn send_to_recipient(
        &self,
        tenant: &TenantRecord,
        template_name: &str,
        template_language: &str,
        header: Option<(&str, &str)>,
        recipient: &BroadcastRecipientRecord,
    ) {
        let components =
            CloudApiClient::broadcast_components(header, &recipient.body_values());
        let envelope = MessageEnvelope::Template {
            template: TemplateMessage::new(template_name, template_language)
                .with_components(components),
        };

        match self.sender.send(tenant, &recipient.phone, &envelope).await {
            Ok(outcome) => {
                if let Err(err) = self
                    .broadcasts
                    .mark_recipient_sent(recipient.id, &outcome.provider_message_id)
                    .await
                {
                    warn!(recipient = %recipient.id, "failed to record send: {err}");
                }
                self.attribute_conversation(tenant, recipient).await;
            }
            Err(err) => {
                warn!(
                    recipient = %recipient.id,
                    phone = %recipient.phone,
                    "broadcast send failed: {err}"
                );
                if let Err(store_err) = self
                    .broadcasts
                    .mark_recipient_failed(recipient.id, &err.to_string())
                    .await
                {
                    warn!(recipient = %recipient.id, "failed to record failure: {store_err}");
                }
            }
        }
    }

    /// Link the recipient's live conversation (when one exists) to this
    /// broadcast so their next reply lands attributed.
    async fn attribute_conversation(
        &self,
        tenant: &TenantRecord,
        recipient: &BroadcastRecipientRecord,
    ) {
        let contact = match self
            .inbox
            .find_contact_by_phone(tenant.id, &recipient.phone)
            .await
        {
            Ok(Some(contact)) => contact,
            Ok(None) => return,
            Err(err) => {
                warn!(phone = %recipient.phone, "contact lookup failed: {err}");
                return;
            }
        };
        let conversation = match self
            .inbox
            .find_live_conversation(tenant.id, contact.id)
            .await
        {
            Ok(Some(conversation)) => conversation,
            Ok(None) => return,
            Err(err) => {
                warn!(contact = %contact.id, "conversation lookup failed: {err}");
                return;
            }
        };
        if conversation.broadcast_id.is_none() {
            if let Err(err) = self
                .inbox
                .attribute_broadcast(conversation.id, recipient.broadcast_id)
                .await
            {
                warn!(conversation = %conversation.id, "attribution failed: {err}");
            }
        }
    }

    async fn publish_progress(&self, tenant: &TenantRecord, broadcast_id: Uuid) -> CoreResult<()> {
        if let Some(broadcast) = self.broadcasts.get(tenant.id, broadcast_id).await? {
            self.realtime.publish(
                Room::Org(tenant.id),
                RealtimeEvent::BroadcastStatusUpdate {
                    broadcast_id,
                    status: broadcast.status.as_str().to_string(),
                    counters: broadcast.counters,
                },
            );
        }
        Ok(())
    }
}
