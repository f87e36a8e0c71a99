//! Message entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::{Direction, MessageKind, MessageRecord, MessageStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub conversation_id: Uuid,

    /// in | out
    pub direction: String,
    pub kind: String,
    pub body: String,
    pub caption: Option<String>,

    pub media_url: Option<String>,
    pub media_id: Option<String>,
    pub media_mime: Option<String>,
    pub media_size: Option<i64>,
    pub filename: Option<String>,

    /// pending | sent | delivered | read | failed
    pub status: String,
    #[sea_orm(unique)]
    pub provider_message_id: Option<String>,
    pub error: Option<String>,

    pub sent_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversation::Entity",
        from = "Column::ConversationId",
        to = "super::conversation::Column::Id"
    )]
    Conversation,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> MessageRecord {
        MessageRecord {
            id: self.id,
            tenant_id: self.organization_id,
            conversation_id: self.conversation_id,
            direction: if self.direction == "out" {
                Direction::Out
            } else {
                Direction::In
            },
            kind: MessageKind::from_provider(&self.kind),
            body: self.body.clone(),
            caption: self.caption.clone(),
            media_url: self.media_url.clone(),
            media_id: self.media_id.clone(),
            media_mime: self.media_mime.clone(),
            media_size: self.media_size,
            filename: self.filename.clone(),
            status: MessageStatus::parse(&self.status).unwrap_or(MessageStatus::Pending),
            provider_message_id: self.provider_message_id.clone(),
            error: self.error.clone(),
            sent_at: self.sent_at,
        }
    }
}
