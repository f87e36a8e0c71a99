//! Broadcast recipient entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::{BroadcastRecipientRecord, MessageStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "broadcast_recipients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub broadcast_id: Uuid,
    pub organization_id: Uuid,

    pub phone: String,
    /// Positional body parameters keyed by slot index.
    pub variables: Json,

    /// Set after a successful send; unique across the platform.
    #[sea_orm(unique)]
    pub provider_message_id: Option<String>,
    /// pending | sent | delivered | read | failed
    pub status: String,
    pub error: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::broadcast::Entity",
        from = "Column::BroadcastId",
        to = "super::broadcast::Column::Id"
    )]
    Broadcast,
}

impl Related<super::broadcast::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Broadcast.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> BroadcastRecipientRecord {
        BroadcastRecipientRecord {
            id: self.id,
            broadcast_id: self.broadcast_id,
            tenant_id: self.organization_id,
            phone: self.phone.clone(),
            variables: self.variables.clone(),
            provider_message_id: self.provider_message_id.clone(),
            status: MessageStatus::parse(&self.status).unwrap_or(MessageStatus::Pending),
            error: self.error.clone(),
        }
    }
}
