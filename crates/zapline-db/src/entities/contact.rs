//! Contact entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::ContactRecord;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "contacts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,

    /// WhatsApp id (digits-only phone as reported by the provider).
    pub wa_id: String,
    pub phone: String,
    pub name: Option<String>,
    pub profile_name: Option<String>,
    pub email: Option<String>,
    pub labels: Json,

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
    #[sea_orm(has_many = "super::conversation::Entity")]
    Conversations,
}

impl Related<super::conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversations.def()
    }
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> ContactRecord {
        ContactRecord {
            id: self.id,
            tenant_id: self.organization_id,
            wa_id: self.wa_id.clone(),
            phone: self.phone.clone(),
            name: self.name.clone(),
            profile_name: self.profile_name.clone(),
            email: self.email.clone(),
            labels: serde_json::from_value(self.labels.clone()).unwrap_or_default(),
        }
    }
}
