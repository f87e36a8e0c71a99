//! Flow session entity
//!
//! The unique (organization_id, contact_id) index enforces one live
//! session per contact; racing creators adopt the winning row.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::SessionRecord;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "flow_sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub contact_id: Uuid,
    pub flow_id: Uuid,

    pub current_node_id: String,
    pub variables: Json,
    pub waiting_on: Option<String>,
    pub last_interaction_at: DateTimeUtc,

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
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            id: self.id,
            tenant_id: self.organization_id,
            contact_id: self.contact_id,
            flow_id: self.flow_id,
            current_node_id: self.current_node_id.clone(),
            variables: self.variables.clone(),
            waiting_on: self.waiting_on.clone(),
            last_interaction_at: self.last_interaction_at,
        }
    }
}
