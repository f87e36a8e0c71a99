//! Realtime event and room types

use crate::model::{BroadcastCounters, ConversationStatus, MessageStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A publication target. Memberships are scoped to the operator's tenant at
/// handshake time; a socket can never join another tenant's rooms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Org(Uuid),
    Conversation(Uuid),
    User(Uuid),
}

impl Room {
    /// Wire label, e.g. `org:<uuid>`.
    pub fn label(&self) -> String {
        match self {
            Room::Org(id) => format!("org:{id}"),
            Room::Conversation(id) => format!("conv:{id}"),
            Room::User(id) => format!("user:{id}"),
        }
    }
}

/// Events pushed to operator sockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RealtimeEvent {
    NewConversation {
        conversation_id: Uuid,
        contact_id: Uuid,
    },
    NewMessage {
        conversation_id: Uuid,
        message_id: Uuid,
        direction: String,
        preview: String,
    },
    MessageStatus {
        conversation_id: Uuid,
        message_id: Uuid,
        provider_message_id: String,
        status: MessageStatus,
    },
    ConversationAssigned {
        conversation_id: Uuid,
        agent_id: Uuid,
    },
    ConversationTransferred {
        conversation_id: Uuid,
        from_agent_id: Option<Uuid>,
        to_agent_id: Uuid,
    },
    ConversationStatusChanged {
        conversation_id: Uuid,
        status: ConversationStatus,
    },
    Typing {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    UserStatus {
        user_id: Uuid,
        online: bool,
    },
    BroadcastStatusUpdate {
        broadcast_id: Uuid,
        status: String,
        counters: BroadcastCounters,
    },
    /// Escape hatch for collaborator surfaces that push their own payloads.
    Custom {
        name: String,
        payload: Value,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_labels() {
        let id = Uuid::nil();
        assert_eq!(Room::Org(id).label(), format!("org:{id}"));
        assert_eq!(Room::Conversation(id).label(), format!("conv:{id}"));
        assert_eq!(Room::User(id).label(), format!("user:{id}"));
    }

    #[test]
    fn event_serializes_with_tag() {
        let event = RealtimeEvent::UserStatus {
            user_id: Uuid::nil(),
            online: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "user_status");
        assert_eq!(json["data"]["online"], true);
    }
}
