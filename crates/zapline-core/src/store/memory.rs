//! In-memory store implementations
//!
//! One [`MemoryStore`] implements every store contract over plain maps. The
//! engine and pipeline tests run against it, and single-process development
//! mode can boot on it without a database. Semantics mirror the relational
//! implementations: idempotent inserts, monotone status advances, atomic
//! counter updates under one lock.

use super::{
    BroadcastStore, FlowStore, InboxStore, NotificationStore, SessionStore, SqlRunner,
    TenantStore,
};
use crate::errors::{CoreError, CoreResult};
use crate::model::{
    BroadcastRecipientRecord, BroadcastRecord, BroadcastStatus, ContactRecord,
    ConversationRecord, ConversationStatus, Direction, FlowRecord, InsertOutcome, MessageRecord,
    MessageStatus, NewMessage, NotificationRecord, NotificationStatus, SessionRecord,
    TenantRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    tenants: HashMap<Uuid, TenantRecord>,
    contacts: HashMap<Uuid, ContactRecord>,
    conversations: HashMap<Uuid, ConversationRecord>,
    messages: Vec<MessageRecord>,
    sessions: HashMap<(Uuid, Uuid), SessionRecord>,
    flows: Vec<FlowRecord>,
    broadcasts: HashMap<Uuid, BroadcastRecord>,
    recipients: HashMap<Uuid, BroadcastRecipientRecord>,
    notifications: HashMap<Uuid, NotificationRecord>,
}

/// In-memory implementation of every store contract.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("memory store lock poisoned")
    }

    // Seeding helpers for tests and development bootstrapping.

    pub fn add_tenant(&self, tenant: TenantRecord) {
        self.lock().tenants.insert(tenant.id, tenant);
    }

    pub fn add_flow(&self, flow: FlowRecord) {
        self.lock().flows.push(flow);
    }

    pub fn add_broadcast(
        &self,
        broadcast: BroadcastRecord,
        recipients: Vec<BroadcastRecipientRecord>,
    ) {
        let mut inner = self.lock();
        inner.broadcasts.insert(broadcast.id, broadcast);
        for recipient in recipients {
            inner.recipients.insert(recipient.id, recipient);
        }
    }

    pub fn add_notification(&self, notification: NotificationRecord) {
        self.lock()
            .notifications
            .insert(notification.id, notification);
    }

    // Inspection helpers for tests.

    pub fn messages(&self) -> Vec<MessageRecord> {
        self.lock().messages.clone()
    }

    pub fn broadcast(&self, id: Uuid) -> Option<BroadcastRecord> {
        self.lock().broadcasts.get(&id).cloned()
    }

    pub fn recipient(&self, id: Uuid) -> Option<BroadcastRecipientRecord> {
        self.lock().recipients.get(&id).cloned()
    }

    pub fn conversation_for_contact(&self, contact_id: Uuid) -> Option<ConversationRecord> {
        self.lock()
            .conversations
            .values()
            .find(|c| c.contact_id == contact_id && c.status.is_live())
            .cloned()
    }

    pub fn session_for_contact(&self, tenant_id: Uuid, contact_id: Uuid) -> Option<SessionRecord> {
        self.lock().sessions.get(&(tenant_id, contact_id)).cloned()
    }

    pub fn notification(&self, id: Uuid) -> Option<NotificationRecord> {
        self.lock().notifications.get(&id).cloned()
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn by_id(&self, id: Uuid) -> CoreResult<Option<TenantRecord>> {
        Ok(self.lock().tenants.get(&id).cloned())
    }

    async fn by_phone_number_id(&self, phone_number_id: &str) -> CoreResult<Option<TenantRecord>> {
        Ok(self
            .lock()
            .tenants
            .values()
            .find(|t| t.phone_number_id == phone_number_id && t.is_active())
            .cloned())
    }
}

#[async_trait]
impl InboxStore for MemoryStore {
    async fn upsert_contact(
        &self,
        tenant_id: Uuid,
        wa_id: &str,
        phone: &str,
        profile_name: Option<&str>,
    ) -> CoreResult<ContactRecord> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .contacts
            .values_mut()
            .find(|c| c.tenant_id == tenant_id && c.wa_id == wa_id)
        {
            if let Some(name) = profile_name {
                existing.profile_name = Some(name.to_string());
            }
            return Ok(existing.clone());
        }
        let contact = ContactRecord {
            id: Uuid::new_v4(),
            tenant_id,
            wa_id: wa_id.to_string(),
            phone: phone.to_string(),
            name: None,
            profile_name: profile_name.map(str::to_string),
            email: None,
            labels: Vec::new(),
        };
        inner.contacts.insert(contact.id, contact.clone());
        Ok(contact)
    }

    async fn find_contact_by_phone(
        &self,
        tenant_id: Uuid,
        phone: &str,
    ) -> CoreResult<Option<ContactRecord>> {
        Ok(self
            .lock()
            .contacts
            .values()
            .find(|c| c.tenant_id == tenant_id && (c.phone == phone || c.wa_id == phone))
            .cloned())
    }

    async fn open_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<ConversationRecord> {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .conversations
            .values()
            .find(|c| c.tenant_id == tenant_id && c.contact_id == contact_id && c.status.is_live())
        {
            return Ok(existing.clone());
        }
        let conversation = ConversationRecord {
            id: Uuid::new_v4(),
            tenant_id,
            contact_id,
            status: ConversationStatus::Pending,
            assigned_agent_id: None,
            unread_count: 0,
            last_message_at: None,
            last_preview: None,
            broadcast_id: None,
        };
        inner
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_live_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<Option<ConversationRecord>> {
        Ok(self
            .lock()
            .conversations
            .values()
            .find(|c| c.tenant_id == tenant_id && c.contact_id == contact_id && c.status.is_live())
            .cloned())
    }

    async fn conversation(&self, id: Uuid) -> CoreResult<Option<ConversationRecord>> {
        Ok(self.lock().conversations.get(&id).cloned())
    }

    async fn insert_incoming(&self, message: NewMessage) -> CoreResult<InsertOutcome> {
        let mut inner = self.lock();
        if let Some(provider_id) = &message.provider_message_id {
            let duplicate = inner
                .messages
                .iter()
                .any(|m| m.provider_message_id.as_ref() == Some(provider_id));
            if duplicate {
                return Ok(InsertOutcome::Duplicate);
            }
        }
        let record = MessageRecord {
            id: Uuid::new_v4(),
            tenant_id: message.tenant_id,
            conversation_id: message.conversation_id,
            direction: message.direction,
            kind: message.kind,
            body: message.body,
            caption: message.caption,
            media_url: message.media_url,
            media_id: message.media_id,
            media_mime: message.media_mime,
            media_size: message.media_size,
            filename: message.filename,
            status: message.status,
            provider_message_id: message.provider_message_id,
            error: None,
            sent_at: message.sent_at,
        };
        inner.messages.push(record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn record_outgoing(&self, message: NewMessage) -> CoreResult<MessageRecord> {
        match self.insert_incoming(message).await? {
            InsertOutcome::Inserted(record) => Ok(record),
            InsertOutcome::Duplicate => Err(CoreError::conflict("provider message id replayed")),
        }
    }

    async fn apply_status(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
        status: MessageStatus,
        error: Option<&str>,
    ) -> CoreResult<Option<MessageRecord>> {
        let mut inner = self.lock();
        let Some(record) = inner.messages.iter_mut().find(|m| {
            m.tenant_id == tenant_id
                && m.provider_message_id.as_deref() == Some(provider_message_id)
        }) else {
            return Ok(None);
        };
        if !record.status.can_advance_to(status) {
            return Ok(None);
        }
        record.status = status;
        if let Some(error) = error {
            record.error = Some(error.to_string());
        }
        Ok(Some(record.clone()))
    }

    async fn touch_conversation_incoming(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.last_preview = Some(preview.to_string());
            conversation.last_message_at = Some(at);
            conversation.unread_count += 1;
        }
        Ok(())
    }

    async fn touch_conversation_outgoing(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.last_preview = Some(preview.to_string());
            conversation.last_message_at = Some(at);
        }
        Ok(())
    }

    async fn mark_read(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
    ) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.unread_count = 0;
        }
        for message in inner.messages.iter_mut() {
            if message.tenant_id == tenant_id
                && message.conversation_id == conversation_id
                && message.direction == Direction::In
                && message_ids.contains(&message.id)
                && message.status.can_advance_to(MessageStatus::Read)
            {
                message.status = MessageStatus::Read;
            }
        }
        Ok(())
    }

    async fn attribute_broadcast(
        &self,
        conversation_id: Uuid,
        broadcast_id: Uuid,
    ) -> CoreResult<bool> {
        let mut inner = self.lock();
        let Some(conversation) = inner.conversations.get_mut(&conversation_id) else {
            return Ok(false);
        };
        if conversation.broadcast_id.is_some() {
            return Ok(false);
        }
        conversation.broadcast_id = Some(broadcast_id);
        Ok(true)
    }

    async fn handoff_to_agent(&self, conversation_id: Uuid) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(conversation) = inner.conversations.get_mut(&conversation_id) {
            conversation.status = ConversationStatus::Open;
        }
        Ok(())
    }

    async fn update_contact_fields(
        &self,
        contact_id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        labels: Option<&[String]>,
    ) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(contact) = inner.contacts.get_mut(&contact_id) {
            if let Some(name) = name {
                contact.name = Some(name.to_string());
            }
            if let Some(email) = email {
                contact.email = Some(email.to_string());
            }
            if let Some(labels) = labels {
                contact.labels = labels.to_vec();
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find(&self, tenant_id: Uuid, contact_id: Uuid) -> CoreResult<Option<SessionRecord>> {
        Ok(self.lock().sessions.get(&(tenant_id, contact_id)).cloned())
    }

    async fn save(&self, session: &SessionRecord) -> CoreResult<()> {
        self.lock()
            .sessions
            .insert((session.tenant_id, session.contact_id), session.clone());
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, contact_id: Uuid) -> CoreResult<()> {
        self.lock().sessions.remove(&(tenant_id, contact_id));
        Ok(())
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> CoreResult<u64> {
        let mut inner = self.lock();
        let before = inner.sessions.len();
        inner
            .sessions
            .retain(|_, session| session.last_interaction_at >= cutoff);
        Ok((before - inner.sessions.len()) as u64)
    }
}

#[async_trait]
impl FlowStore for MemoryStore {
    async fn enabled_flows(&self, tenant_id: Uuid) -> CoreResult<Vec<FlowRecord>> {
        Ok(self
            .lock()
            .flows
            .iter()
            .filter(|f| f.tenant_id == tenant_id && f.enabled)
            .cloned()
            .collect())
    }

    async fn flow(&self, tenant_id: Uuid, flow_id: Uuid) -> CoreResult<Option<FlowRecord>> {
        Ok(self
            .lock()
            .flows
            .iter()
            .find(|f| f.tenant_id == tenant_id && f.id == flow_id)
            .cloned())
    }
}

#[async_trait]
impl BroadcastStore for MemoryStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> CoreResult<Option<BroadcastRecord>> {
        Ok(self
            .lock()
            .broadcasts
            .get(&id)
            .filter(|b| b.tenant_id == tenant_id)
            .cloned())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[BroadcastStatus],
        to: BroadcastStatus,
        at: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let mut inner = self.lock();
        let Some(broadcast) = inner.broadcasts.get_mut(&id) else {
            return Ok(false);
        };
        if !from.contains(&broadcast.status) {
            return Ok(false);
        }
        broadcast.status = to;
        match to {
            BroadcastStatus::Processing => broadcast.started_at = Some(at),
            BroadcastStatus::Completed | BroadcastStatus::Failed => {
                broadcast.completed_at = Some(at)
            }
            _ => {}
        }
        Ok(true)
    }

    async fn status(&self, id: Uuid) -> CoreResult<Option<BroadcastStatus>> {
        Ok(self.lock().broadcasts.get(&id).map(|b| b.status))
    }

    async fn recipients(&self, broadcast_id: Uuid) -> CoreResult<Vec<BroadcastRecipientRecord>> {
        let mut recipients: Vec<_> = self
            .lock()
            .recipients
            .values()
            .filter(|r| r.broadcast_id == broadcast_id)
            .cloned()
            .collect();
        recipients.sort_by(|a, b| a.phone.cmp(&b.phone));
        Ok(recipients)
    }

    async fn mark_recipient_sent(
        &self,
        recipient_id: Uuid,
        provider_message_id: &str,
    ) -> CoreResult<()> {
        let mut inner = self.lock();
        let Some(recipient) = inner.recipients.get_mut(&recipient_id) else {
            return Err(CoreError::not_found(
                "broadcast recipient".to_string(),
                recipient_id.to_string(),
            ));
        };
        recipient.provider_message_id = Some(provider_message_id.to_string());
        recipient.status = MessageStatus::Sent;
        let broadcast_id = recipient.broadcast_id;
        if let Some(broadcast) = inner.broadcasts.get_mut(&broadcast_id) {
            broadcast.counters.sent += 1;
        }
        Ok(())
    }

    async fn mark_recipient_failed(&self, recipient_id: Uuid, error: &str) -> CoreResult<()> {
        let mut inner = self.lock();
        let Some(recipient) = inner.recipients.get_mut(&recipient_id) else {
            return Err(CoreError::not_found(
                "broadcast recipient".to_string(),
                recipient_id.to_string(),
            ));
        };
        recipient.status = MessageStatus::Failed;
        recipient.error = Some(error.to_string());
        let broadcast_id = recipient.broadcast_id;
        if let Some(broadcast) = inner.broadcasts.get_mut(&broadcast_id) {
            broadcast.counters.failed += 1;
        }
        Ok(())
    }

    async fn find_recipient_by_provider_id(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
    ) -> CoreResult<Option<(BroadcastRecipientRecord, BroadcastRecord)>> {
        let inner = self.lock();
        let Some(recipient) = inner.recipients.values().find(|r| {
            r.tenant_id == tenant_id
                && r.provider_message_id.as_deref() == Some(provider_message_id)
        }) else {
            return Ok(None);
        };
        let Some(broadcast) = inner.broadcasts.get(&recipient.broadcast_id) else {
            return Ok(None);
        };
        Ok(Some((recipient.clone(), broadcast.clone())))
    }

    async fn advance_recipient_status(
        &self,
        recipient_id: Uuid,
        status: MessageStatus,
        error: Option<&str>,
    ) -> CoreResult<bool> {
        let mut inner = self.lock();
        let Some(recipient) = inner.recipients.get_mut(&recipient_id) else {
            return Ok(false);
        };
        if !recipient.status.can_advance_to(status) {
            return Ok(false);
        }
        // A read arriving before its delivered implies delivery; count both
        // so `delivered ≥ read` holds.
        let skipped_delivered =
            status == MessageStatus::Read && recipient.status.rank() < MessageStatus::Delivered.rank();
        recipient.status = status;
        if let Some(error) = error {
            recipient.error = Some(error.to_string());
        }
        let broadcast_id = recipient.broadcast_id;
        if let Some(broadcast) = inner.broadcasts.get_mut(&broadcast_id) {
            match status {
                MessageStatus::Delivered => broadcast.counters.delivered += 1,
                MessageStatus::Read => {
                    broadcast.counters.read += 1;
                    if skipped_delivered {
                        broadcast.counters.delivered += 1;
                    }
                }
                MessageStatus::Failed => broadcast.counters.failed += 1,
                _ => {}
            }
        }
        Ok(true)
    }

    async fn increment_replied(&self, broadcast_id: Uuid) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(broadcast) = inner.broadcasts.get_mut(&broadcast_id) {
            broadcast.counters.replied += 1;
        }
        Ok(())
    }

    async fn recent_broadcast_for_phone(
        &self,
        tenant_id: Uuid,
        phone: &str,
        within: Duration,
    ) -> CoreResult<Option<BroadcastRecord>> {
        let inner = self.lock();
        let cutoff = Utc::now() - within;
        let mut best: Option<&BroadcastRecord> = None;
        for recipient in inner.recipients.values() {
            if recipient.tenant_id != tenant_id || recipient.phone != phone {
                continue;
            }
            let Some(broadcast) = inner.broadcasts.get(&recipient.broadcast_id) else {
                continue;
            };
            let Some(started) = broadcast.started_at else {
                continue;
            };
            if started < cutoff {
                continue;
            }
            if best.map_or(true, |b| b.started_at < broadcast.started_at) {
                best = Some(broadcast);
            }
        }
        Ok(best.cloned())
    }

    async fn due_scheduled(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<BroadcastRecord>> {
        Ok(self
            .lock()
            .broadcasts
            .values()
            .filter(|b| {
                b.status == BroadcastStatus::Scheduled
                    && b.scheduled_at.map_or(false, |at| at <= cutoff)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<NotificationRecord>> {
        let mut due: Vec<_> = self
            .lock()
            .notifications
            .values()
            .filter(|n| n.status == NotificationStatus::Pending && n.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|n| n.scheduled_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn mark_sent(&self, id: Uuid) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(notification) = inner.notifications.get_mut(&id) {
            notification.status = NotificationStatus::Sent;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> CoreResult<()> {
        let mut inner = self.lock();
        if let Some(notification) = inner.notifications.get_mut(&id) {
            notification.status = NotificationStatus::Failed;
            notification.error = Some(error.to_string());
        }
        Ok(())
    }
}

/// A `SqlRunner` that refuses every query; development default when no
/// database is attached.
pub struct DeniedSqlRunner;

#[async_trait]
impl SqlRunner for DeniedSqlRunner {
    async fn query(
        &self,
        _tenant_id: Uuid,
        _sql: &str,
        _params: &[Value],
    ) -> CoreResult<Vec<Value>> {
        Err(CoreError::internal("no sql runner configured"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(tenant_id: Uuid, conversation_id: Uuid, wamid: &str) -> NewMessage {
        let mut message = NewMessage::text(tenant_id, conversation_id, Direction::In, "hi");
        message.provider_message_id = Some(wamid.to_string());
        message.status = MessageStatus::Delivered;
        message
    }

    #[tokio::test]
    async fn duplicate_provider_id_is_rejected() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();

        let first = store
            .insert_incoming(new_message(tenant_id, conversation_id, "wamid.X"))
            .await
            .unwrap();
        assert!(matches!(first, InsertOutcome::Inserted(_)));

        let second = store
            .insert_incoming(new_message(tenant_id, conversation_id, "wamid.X"))
            .await
            .unwrap();
        assert!(matches!(second, InsertOutcome::Duplicate));
        assert_eq!(store.messages().len(), 1);
    }

    #[tokio::test]
    async fn status_downgrade_is_ignored() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let conversation_id = Uuid::new_v4();
        let mut message = NewMessage::text(tenant_id, conversation_id, Direction::Out, "out");
        message.provider_message_id = Some("wamid.out".to_string());
        message.status = MessageStatus::Sent;
        store.record_outgoing(message).await.unwrap();

        let advanced = store
            .apply_status(tenant_id, "wamid.out", MessageStatus::Read, None)
            .await
            .unwrap();
        assert!(advanced.is_some());

        let downgraded = store
            .apply_status(tenant_id, "wamid.out", MessageStatus::Delivered, None)
            .await
            .unwrap();
        assert!(downgraded.is_none());
        assert_eq!(store.messages()[0].status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn open_conversation_reuses_live_row() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let contact = store
            .upsert_contact(tenant_id, "911234500001", "911234500001", Some("Maria"))
            .await
            .unwrap();

        let first = store.open_conversation(tenant_id, contact.id).await.unwrap();
        let second = store.open_conversation(tenant_id, contact.id).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn mark_read_zeroes_unread_and_marks_only_named_messages() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let contact = store
            .upsert_contact(tenant_id, "911234500001", "911234500001", None)
            .await
            .unwrap();
        let conversation = store.open_conversation(tenant_id, contact.id).await.unwrap();

        let mut first = None;
        for wamid in ["wamid.a", "wamid.b"] {
            let outcome = store
                .insert_incoming(new_message(tenant_id, conversation.id, wamid))
                .await
                .unwrap();
            if let InsertOutcome::Inserted(record) = outcome {
                store
                    .touch_conversation_incoming(conversation.id, &record.body, record.sent_at)
                    .await
                    .unwrap();
                first.get_or_insert(record.id);
            }
        }
        assert_eq!(
            store.conversation_for_contact(contact.id).unwrap().unread_count,
            2
        );

        store
            .mark_read(tenant_id, conversation.id, &[first.unwrap()])
            .await
            .unwrap();

        let conversation = store.conversation_for_contact(contact.id).unwrap();
        assert_eq!(conversation.unread_count, 0);
        let messages = store.messages();
        assert_eq!(messages[0].status, MessageStatus::Read);
        // The second message was not named, so it keeps its status.
        assert_eq!(messages[1].status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn read_before_delivered_counts_both() {
        let store = MemoryStore::new();
        let tenant_id = Uuid::new_v4();
        let broadcast_id = Uuid::new_v4();
        let recipient_id = Uuid::new_v4();
        store.add_broadcast(
            BroadcastRecord {
                id: broadcast_id,
                tenant_id,
                name: "promo".to_string(),
                template_name: "promo_1".to_string(),
                template_language: "en".to_string(),
                header_media_id: None,
                header_media_type: None,
                status: BroadcastStatus::Processing,
                counters: Default::default(),
                chatbot_enabled: true,
                scheduled_at: None,
                started_at: Some(Utc::now()),
                completed_at: None,
            },
            vec![BroadcastRecipientRecord {
                id: recipient_id,
                broadcast_id,
                tenant_id,
                phone: "911234500001".to_string(),
                variables: serde_json::json!({}),
                provider_message_id: Some("wamid.b1".to_string()),
                status: MessageStatus::Sent,
                error: None,
            }],
        );

        let advanced = store
            .advance_recipient_status(recipient_id, MessageStatus::Read, None)
            .await
            .unwrap();
        assert!(advanced);

        let broadcast = store.broadcast(broadcast_id).unwrap();
        assert_eq!(broadcast.counters.read, 1);
        assert_eq!(broadcast.counters.delivered, 1);
    }
}
