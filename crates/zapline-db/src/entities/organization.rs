//! Organization (tenant) entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use zapline_core::model::{SubscriptionStatus, TenantRecord};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "organizations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,

    // Cloud API credentials
    pub access_token: String,
    #[sea_orm(unique)]
    pub phone_number_id: String,
    pub business_account_id: String,
    pub display_phone_number: String,

    // Webhook configuration
    pub verify_token: String,
    pub external_webhook_url: Option<String>,
    pub external_webhook_secret: Option<String>,

    /// Key for the external send surface (`/integrations/*`).
    #[sea_orm(unique)]
    pub api_key: Option<String>,

    // Subscription
    pub subscription_status: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::contact::Entity")]
    Contacts,
    #[sea_orm(has_many = "super::flow::Entity")]
    Flows,
    #[sea_orm(has_many = "super::broadcast::Entity")]
    Broadcasts,
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contacts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn to_record(&self) -> TenantRecord {
        TenantRecord {
            id: self.id,
            name: self.name.clone(),
            access_token: self.access_token.clone(),
            phone_number_id: self.phone_number_id.clone(),
            business_account_id: self.business_account_id.clone(),
            display_phone_number: self.display_phone_number.clone(),
            verify_token: self.verify_token.clone(),
            external_webhook_url: self.external_webhook_url.clone(),
            external_webhook_secret: self.external_webhook_secret.clone(),
            subscription: SubscriptionStatus::parse(&self.subscription_status)
                .unwrap_or(SubscriptionStatus::Closed),
        }
    }
}
