//! Template mirror entity
//!
//! Local copy of provider-side templates, refreshed by the template sync;
//! unique per (organization, name).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "templates")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub organization_id: Uuid,

    pub name: String,
    pub language: String,
    pub category: Option<String>,
    /// approved | pending | rejected, as reported by the provider.
    pub status: Option<String>,
    pub components: Json,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
