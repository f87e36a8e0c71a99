//! Broadcast entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::{BroadcastCounters, BroadcastRecord, BroadcastStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "broadcasts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,

    pub template_name: String,
    pub template_language: String,
    pub header_media_id: Option<String>,
    pub header_media_type: Option<String>,

    /// pending | scheduled | processing | completed | failed | cancelled
    pub status: String,

    // Counters; mutated only via atomic increments.
    pub total_count: i32,
    pub sent_count: i32,
    pub delivered_count: i32,
    pub read_count: i32,
    pub failed_count: i32,
    pub replied_count: i32,

    /// Whether replies from recipients should still run the chatbot.
    pub chatbot_enabled: bool,

    pub scheduled_at: Option<DateTimeUtc>,
    pub started_at: Option<DateTimeUtc>,
    pub completed_at: Option<DateTimeUtc>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::organization::Entity",
        from = "Column::OrganizationId",
        to = "super::organization::Column::Id"
    )]
    Organization,
    #[sea_orm(has_many = "super::broadcast_recipient::Entity")]
    Recipients,
}

impl Related<super::broadcast_recipient::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Recipients.def()
    }
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> BroadcastRecord {
        BroadcastRecord {
            id: self.id,
            tenant_id: self.organization_id,
            name: self.name.clone(),
            template_name: self.template_name.clone(),
            template_language: self.template_language.clone(),
            header_media_id: self.header_media_id.clone(),
            header_media_type: self.header_media_type.clone(),
            status: BroadcastStatus::parse(&self.status).unwrap_or(BroadcastStatus::Failed),
            counters: BroadcastCounters {
                total: self.total_count,
                sent: self.sent_count,
                delivered: self.delivered_count,
                read: self.read_count,
                failed: self.failed_count,
                replied: self.replied_count,
            },
            chatbot_enabled: self.chatbot_enabled,
            scheduled_at: self.scheduled_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}
