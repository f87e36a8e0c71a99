//! Store contracts shared by the ingester, interpreter, and dispatcher
//!
//! Implementations live in `zapline-db` (sea-orm) and in [`memory`]
//! (in-memory, used by tests and by single-process development mode). All
//! operations are tenant-scoped: callers pass the tenant id and
//! implementations must never return rows owned by another tenant.

pub mod memory;

use crate::errors::CoreResult;
use crate::model::{
    BroadcastRecipientRecord, BroadcastRecord, BroadcastStatus, ContactRecord,
    ConversationRecord, FlowRecord, InsertOutcome, MessageRecord, MessageStatus, NewMessage,
    NotificationRecord, SessionRecord, TenantRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Tenant lookup.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn by_id(&self, id: Uuid) -> CoreResult<Option<TenantRecord>>;

    /// Resolve an active tenant by the provider's phone-number id. Inactive
    /// tenants are not returned; their webhooks are dropped upstream.
    async fn by_phone_number_id(&self, phone_number_id: &str) -> CoreResult<Option<TenantRecord>>;
}

/// Contacts, conversations, and messages: the shared source of truth.
///
/// Conversation-level mutations (unread counter, status, preview) must be
/// applied atomically per conversation; implementations use row-scoped
/// updates so concurrent webhook deliveries cannot lose increments.
#[async_trait]
pub trait InboxStore: Send + Sync {
    /// Create the contact on first sight, or refresh its profile name.
    async fn upsert_contact(
        &self,
        tenant_id: Uuid,
        wa_id: &str,
        phone: &str,
        profile_name: Option<&str>,
    ) -> CoreResult<ContactRecord>;

    async fn find_contact_by_phone(
        &self,
        tenant_id: Uuid,
        phone: &str,
    ) -> CoreResult<Option<ContactRecord>>;

    /// Reuse the live conversation for the contact or open a new one.
    async fn open_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<ConversationRecord>;

    /// The live conversation for the contact, if one exists.
    async fn find_live_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<Option<ConversationRecord>>;

    async fn conversation(&self, id: Uuid) -> CoreResult<Option<ConversationRecord>>;

    /// Insert an incoming message, keyed on the provider message id.
    /// Replays of the same id return [`InsertOutcome::Duplicate`].
    async fn insert_incoming(&self, message: NewMessage) -> CoreResult<InsertOutcome>;

    /// Record an outgoing message (interpreter, operator, or API send).
    async fn record_outgoing(&self, message: NewMessage) -> CoreResult<MessageRecord>;

    /// Advance a message's status by provider id, monotonically. Returns the
    /// updated record when the status actually advanced, `None` when the
    /// update was a downgrade, a repeat, or the id is unknown.
    async fn apply_status(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
        status: MessageStatus,
        error: Option<&str>,
    ) -> CoreResult<Option<MessageRecord>>;

    /// Update preview + last-message time and increment the unread counter.
    async fn touch_conversation_incoming(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Update preview + last-message time without touching unread.
    async fn touch_conversation_outgoing(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()>;

    /// Zero the unread counter and mark the named inbound messages read.
    async fn mark_read(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
    ) -> CoreResult<()>;

    /// Attribute the conversation to a broadcast. Returns `false` when the
    /// conversation was already attributed.
    async fn attribute_broadcast(
        &self,
        conversation_id: Uuid,
        broadcast_id: Uuid,
    ) -> CoreResult<bool>;

    /// Hand the conversation to a human: status becomes `open`.
    async fn handoff_to_agent(&self, conversation_id: Uuid) -> CoreResult<()>;

    /// Mutate contact profile fields from a flow (`update_contact` node).
    async fn update_contact_fields(
        &self,
        contact_id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        labels: Option<&[String]>,
    ) -> CoreResult<()>;
}

/// Flow-session persistence. The store enforces one session per
/// (tenant, contact); racing creators adopt the winning row.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, tenant_id: Uuid, contact_id: Uuid) -> CoreResult<Option<SessionRecord>>;

    async fn save(&self, session: &SessionRecord) -> CoreResult<()>;

    async fn delete(&self, tenant_id: Uuid, contact_id: Uuid) -> CoreResult<()>;

    /// Drop sessions whose last interaction is older than their flow's
    /// timeout. Returns how many were removed.
    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> CoreResult<u64>;
}

/// Flow-definition lookup.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Enabled flows for a tenant, in creation order.
    async fn enabled_flows(&self, tenant_id: Uuid) -> CoreResult<Vec<FlowRecord>>;

    async fn flow(&self, tenant_id: Uuid, flow_id: Uuid) -> CoreResult<Option<FlowRecord>>;
}

/// Broadcast state and counters. Counter mutations are atomic increments;
/// the `sent ≥ delivered ≥ read` invariant holds because recipient status
/// advances monotonically and each advance increments exactly one counter.
#[async_trait]
pub trait BroadcastStore: Send + Sync {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> CoreResult<Option<BroadcastRecord>>;

    /// Compare-and-set the status. Returns `false` when the current status
    /// is not in `from` (the transition is refused, nothing changes).
    async fn transition(
        &self,
        id: Uuid,
        from: &[BroadcastStatus],
        to: BroadcastStatus,
        at: DateTime<Utc>,
    ) -> CoreResult<bool>;

    async fn status(&self, id: Uuid) -> CoreResult<Option<BroadcastStatus>>;

    async fn recipients(&self, broadcast_id: Uuid) -> CoreResult<Vec<BroadcastRecipientRecord>>;

    /// Record a successful send: provider id + `sent` status on the
    /// recipient, `sent` counter incremented.
    async fn mark_recipient_sent(
        &self,
        recipient_id: Uuid,
        provider_message_id: &str,
    ) -> CoreResult<()>;

    /// Record a failed send: error on the recipient, `failed` counter
    /// incremented.
    async fn mark_recipient_failed(&self, recipient_id: Uuid, error: &str) -> CoreResult<()>;

    /// Locate a recipient (and its broadcast) by provider message id.
    async fn find_recipient_by_provider_id(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
    ) -> CoreResult<Option<(BroadcastRecipientRecord, BroadcastRecord)>>;

    /// Advance a recipient's delivery status monotonically, incrementing the
    /// matching broadcast counter on an actual advance. Returns whether the
    /// status advanced.
    async fn advance_recipient_status(
        &self,
        recipient_id: Uuid,
        status: MessageStatus,
        error: Option<&str>,
    ) -> CoreResult<bool>;

    /// Bump the reply counter when a conversation gets attributed.
    async fn increment_replied(&self, broadcast_id: Uuid) -> CoreResult<()>;

    /// The most recent broadcast that targeted this phone within the
    /// attribution window, if any.
    async fn recent_broadcast_for_phone(
        &self,
        tenant_id: Uuid,
        phone: &str,
        within: Duration,
    ) -> CoreResult<Option<BroadcastRecord>>;

    /// Scheduled broadcasts whose `scheduled_at` has passed `cutoff`.
    async fn due_scheduled(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<BroadcastRecord>>;
}

/// Deferred notification queue.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Pending notifications due at `now`, oldest first, bounded.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<NotificationRecord>>;

    async fn mark_sent(&self, id: Uuid) -> CoreResult<()>;

    async fn mark_failed(&self, id: Uuid, error: &str) -> CoreResult<()>;
}

/// Seam for the flow interpreter's `sql` node: a parameterized, tenant-scoped
/// query returning JSON rows.
#[async_trait]
pub trait SqlRunner: Send + Sync {
    async fn query(
        &self,
        tenant_id: Uuid,
        sql: &str,
        params: &[Value],
    ) -> CoreResult<Vec<Value>>;
}
