//! Conversation entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::{ConversationRecord, ConversationStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub contact_id: Uuid,

    /// open | pending | resolved | closed
    pub status: String,
    pub assigned_agent_id: Option<Uuid>,

    pub unread_count: i32,
    pub last_message_at: Option<DateTimeUtc>,
    pub last_preview: Option<String>,

    /// Broadcast this conversation is attributed to, set on first reply.
    pub broadcast_id: Option<Uuid>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id"
    )]
    Contact,
    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> ConversationRecord {
        ConversationRecord {
            id: self.id,
            tenant_id: self.organization_id,
            contact_id: self.contact_id,
            status: ConversationStatus::parse(&self.status).unwrap_or(ConversationStatus::Closed),
            assigned_agent_id: self.assigned_agent_id,
            unread_count: self.unread_count,
            last_message_at: self.last_message_at,
            last_preview: self.last_preview.clone(),
            broadcast_id: self.broadcast_id,
        }
    }
}
