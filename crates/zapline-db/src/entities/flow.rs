//! Flow definition entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::FlowRecord;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "flows")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,

    /// Node + edge document, parsed by `zapline-flow`.
    pub definition: Json,
    pub trigger_keyword: Option<String>,
    /// At most one default flow per organization.
    pub is_default: bool,
    pub enabled: bool,
    pub session_timeout_secs: i64,
    pub working_hours: Option<Json>,

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
}

impl Related<super::organization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Organization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> FlowRecord {
        FlowRecord {
            id: self.id,
            tenant_id: self.organization_id,
            name: self.name.clone(),
            definition: self.definition.clone(),
            trigger_keyword: self.trigger_keyword.clone(),
            is_default: self.is_default,
            enabled: self.enabled,
            session_timeout_secs: self.session_timeout_secs,
            working_hours: self.working_hours.clone(),
        }
    }
}
