//! Domain records shared by the store contracts
//!
//! These are plain data structs, deliberately independent of the ORM models
//! in `zapline-db` so the interpreter and dispatcher can be exercised
//! against in-memory stores. Every record carries its owning tenant id;
//! cross-tenant references are forbidden.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use zapline_whatsapp::ProviderCredentials;

/// Tenant subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Closed,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "closed" => Some(Self::Closed),
            "expired" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// One organization: an isolated customer with its own provider credentials.
#[derive(Debug, Clone)]
pub struct TenantRecord {
    pub id: Uuid,
    pub name: String,
    pub access_token: String,
    pub phone_number_id: String,
    pub business_account_id: String,
    pub display_phone_number: String,
    pub verify_token: String,
    pub external_webhook_url: Option<String>,
    pub external_webhook_secret: Option<String>,
    pub subscription: SubscriptionStatus,
}

impl TenantRecord {
    pub fn credentials(&self) -> ProviderCredentials {
        ProviderCredentials {
            access_token: self.access_token.clone(),
            phone_number_id: self.phone_number_id.clone(),
            business_account_id: self.business_account_id.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.subscription == SubscriptionStatus::Active
    }
}

/// A WhatsApp contact, created lazily on first inbound message.
#[derive(Debug, Clone)]
pub struct ContactRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub wa_id: String,
    pub phone: String,
    pub name: Option<String>,
    pub profile_name: Option<String>,
    pub email: Option<String>,
    pub labels: Vec<String>,
}

impl ContactRecord {
    /// Display name preference: explicit name, then profile name, then a
    /// generic fallback.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.profile_name.clone())
            .unwrap_or_else(|| "Customer".to_string())
    }
}

/// Conversation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Pending,
    Resolved,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "pending" => Some(Self::Pending),
            "resolved" => Some(Self::Resolved),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    /// Whether the conversation can absorb new inbound messages.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Open | Self::Pending)
    }
}

/// One conversation between a tenant and a contact. At most one live
/// conversation exists per (tenant, contact) at any time.
#[derive(Debug, Clone)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contact_id: Uuid,
    pub status: ConversationStatus,
    pub assigned_agent_id: Option<Uuid>,
    pub unread_count: i32,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_preview: Option<String>,
    pub broadcast_id: Option<Uuid>,
}

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

/// Persisted message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Location,
    Contacts,
    Sticker,
    Interactive,
    Button,
    List,
    Template,
    Reaction,
    Order,
    Catalog,
    Flow,
    System,
    Unknown,
}

impl MessageKind {
    /// Map the provider's message `type` string.
    pub fn from_provider(kind: &str) -> Self {
        match kind {
            "text" => Self::Text,
            "image" => Self::Image,
            "video" => Self::Video,
            "audio" => Self::Audio,
            "document" => Self::Document,
            "location" => Self::Location,
            "contacts" => Self::Contacts,
            "sticker" => Self::Sticker,
            "interactive" => Self::Interactive,
            "button" => Self::Button,
            "list" => Self::List,
            "template" => Self::Template,
            "reaction" => Self::Reaction,
            "order" => Self::Order,
            "catalog" => Self::Catalog,
            "flow" => Self::Flow,
            "system" => Self::System,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
            Self::Location => "location",
            Self::Contacts => "contacts",
            Self::Sticker => "sticker",
            Self::Interactive => "interactive",
            Self::Button => "button",
            Self::List => "list",
            Self::Template => "template",
            Self::Reaction => "reaction",
            Self::Order => "order",
            Self::Catalog => "catalog",
            Self::Flow => "flow",
            Self::System => "system",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the provider attaches downloadable media to this kind.
    pub fn has_media(&self) -> bool {
        matches!(
            self,
            Self::Image | Self::Video | Self::Audio | Self::Document | Self::Sticker
        )
    }
}

/// Delivery status of a persisted message. Advances monotonically along
/// `pending → sent → delivered → read`; `failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Sent => 1,
            Self::Delivered => 2,
            Self::Read => 3,
            Self::Failed => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether a transition from `self` to `next` is an advance. Downgrades
    /// (`read` → `delivered`) and repeats are silently ignored; nothing
    /// leaves `failed`.
    pub fn can_advance_to(&self, next: MessageStatus) -> bool {
        if *self == Self::Failed {
            return false;
        }
        if next == Self::Failed {
            // Terminal failure is accepted from any non-terminal state.
            return true;
        }
        next.rank() > self.rank()
    }

    pub fn from_provider(kind: zapline_whatsapp::StatusKind) -> Self {
        match kind {
            zapline_whatsapp::StatusKind::Sent => Self::Sent,
            zapline_whatsapp::StatusKind::Delivered => Self::Delivered,
            zapline_whatsapp::StatusKind::Read => Self::Read,
            zapline_whatsapp::StatusKind::Failed => Self::Failed,
        }
    }
}

/// A message row, persisted under one tenant and conversation.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub direction: Direction,
    pub kind: MessageKind,
    pub body: String,
    pub caption: Option<String>,
    pub media_url: Option<String>,
    pub media_id: Option<String>,
    pub media_mime: Option<String>,
    pub media_size: Option<i64>,
    pub filename: Option<String>,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

/// Input for inserting a message row.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub tenant_id: Uuid,
    pub conversation_id: Uuid,
    pub direction: Direction,
    pub kind: MessageKind,
    pub body: String,
    pub caption: Option<String>,
    pub media_url: Option<String>,
    pub media_id: Option<String>,
    pub media_mime: Option<String>,
    pub media_size: Option<i64>,
    pub filename: Option<String>,
    pub status: MessageStatus,
    pub provider_message_id: Option<String>,
    pub sent_at: DateTime<Utc>,
}

impl NewMessage {
    /// A bare text message skeleton; callers fill in media fields as needed.
    pub fn text(
        tenant_id: Uuid,
        conversation_id: Uuid,
        direction: Direction,
        body: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            conversation_id,
            direction,
            kind: MessageKind::Text,
            body: body.into(),
            caption: None,
            media_url: None,
            media_id: None,
            media_mime: None,
            media_size: None,
            filename: None,
            status: MessageStatus::Pending,
            provider_message_id: None,
            sent_at: Utc::now(),
        }
    }
}

/// Result of an idempotent incoming-message insert.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted(MessageRecord),
    /// A row with the same provider message id already exists.
    Duplicate,
}

/// Broadcast lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastStatus {
    Pending,
    Scheduled,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl BroadcastStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scheduled => "scheduled",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "scheduled" => Some(Self::Scheduled),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Aggregate counters on a broadcast. `sent ≥ delivered ≥ read` always.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastCounters {
    pub total: i32,
    pub sent: i32,
    pub delivered: i32,
    pub read: i32,
    pub failed: i32,
    pub replied: i32,
}

/// One bulk template send.
#[derive(Debug, Clone)]
pub struct BroadcastRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub template_name: String,
    pub template_language: String,
    pub header_media_id: Option<String>,
    pub header_media_type: Option<String>,
    pub status: BroadcastStatus,
    pub counters: BroadcastCounters,
    pub chatbot_enabled: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One recipient of a broadcast.
#[derive(Debug, Clone)]
pub struct BroadcastRecipientRecord {
    pub id: Uuid,
    pub broadcast_id: Uuid,
    pub tenant_id: Uuid,
    pub phone: String,
    /// Positional body parameters keyed by slot index ("1", "2", ...).
    pub variables: Value,
    pub provider_message_id: Option<String>,
    pub status: MessageStatus,
    pub error: Option<String>,
}

impl BroadcastRecipientRecord {
    /// Body parameter values in slot order. Non-numeric keys sort after the
    /// numeric ones, lexicographically.
    pub fn body_values(&self) -> Vec<String> {
        let Some(map) = self.variables.as_object() else {
            return Vec::new();
        };
        let mut entries: Vec<(&String, String)> = map
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k, text)
            })
            .collect();
        entries.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        });
        entries.into_iter().map(|(_, v)| v).collect()
    }
}

/// Scheduled notification state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A deferred template send (abandoned cart and similar), de-duplicated on
/// (tenant, external id).
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub external_id: String,
    pub phone: String,
    pub template_name: String,
    pub template_language: String,
    pub payload: Value,
    pub status: NotificationStatus,
    pub scheduled_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// A stored flow definition. Nodes and edges stay as a JSON document here;
/// `zapline-flow` parses them into the typed graph.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub definition: Value,
    pub trigger_keyword: Option<String>,
    pub is_default: bool,
    pub enabled: bool,
    pub session_timeout_secs: i64,
    pub working_hours: Option<Value>,
}

/// A live flow execution for one (tenant, contact). The variable bag is
/// stored as JSON; the interpreter owns its typed form.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub contact_id: Uuid,
    pub flow_id: Uuid,
    pub current_node_id: String,
    pub variables: Value,
    /// Kind of input the session is suspended on, when any ("wait",
    /// "button", "list", "flow").
    pub waiting_on: Option<String>,
    pub last_interaction_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_advance_is_monotone() {
        assert!(MessageStatus::Pending.can_advance_to(MessageStatus::Sent));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Delivered));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Read));
        assert!(!MessageStatus::Read.can_advance_to(MessageStatus::Delivered));
        assert!(!MessageStatus::Delivered.can_advance_to(MessageStatus::Delivered));
        assert!(MessageStatus::Sent.can_advance_to(MessageStatus::Failed));
        assert!(!MessageStatus::Failed.can_advance_to(MessageStatus::Read));
    }

    #[test]
    fn recipient_body_values_sort_numerically() {
        let recipient = BroadcastRecipientRecord {
            id: Uuid::new_v4(),
            broadcast_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            phone: "911234500001".to_string(),
            variables: json!({ "10": "tenth", "2": "second", "1": "first" }),
            provider_message_id: None,
            status: MessageStatus::Pending,
            error: None,
        };
        assert_eq!(recipient.body_values(), vec!["first", "second", "tenth"]);
    }

    #[test]
    fn unknown_provider_kind_maps_to_unknown() {
        assert_eq!(MessageKind::from_provider("ephemeral"), MessageKind::Unknown);
        assert_eq!(MessageKind::from_provider("text"), MessageKind::Text);
        assert!(MessageKind::Sticker.has_media());
        assert!(!MessageKind::Location.has_media());
    }

    #[test]
    fn contact_display_name_fallback() {
        let mut contact = ContactRecord {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            wa_id: "911234500001".to_string(),
            phone: "911234500001".to_string(),
            name: None,
            profile_name: None,
            email: None,
            labels: vec![],
        };
        assert_eq!(contact.display_name(), "Customer");
        contact.profile_name = Some("Maria".to_string());
        assert_eq!(contact.display_name(), "Maria");
        contact.name = Some("Maria Silva".to_string());
        assert_eq!(contact.display_name(), "Maria Silva");
    }
}
