//! Scheduled notification entity (abandoned-cart and similar deferred sends)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::{NotificationRecord, NotificationStatus};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "scheduled_notifications")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,

    /// De-duplication key from the originating system (cart id, order id).
    pub external_id: String,
    pub phone: String,
    pub template_name: String,
    pub template_language: String,
    pub payload: Json,

    /// pending | sent | failed | cancelled
    pub status: String,
    pub scheduled_at: DateTimeUtc,
    pub error: Option<String>,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> NotificationRecord {
        NotificationRecord {
            id: self.id,
            tenant_id: self.organization_id,
            external_id: self.external_id.clone(),
            phone: self.phone.clone(),
            template_name: self.template_name.clone(),
            template_language: self.template_language.clone(),
            payload: self.payload.clone(),
            status: NotificationStatus::parse(&self.status).unwrap_or(NotificationStatus::Failed),
            scheduled_at: self.scheduled_at,
            error: self.error.clone(),
        }
    }
}
