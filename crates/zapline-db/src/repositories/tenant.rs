//! Tenant lookup

use super::PgStore;
use crate::entities::organization;
use crate::error::DatabaseError;
use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;
use zapline_core::model::TenantRecord;
use zapline_core::store::TenantStore;
use zapline_core::CoreResult;

impl PgStore {
    /// Resolve a tenant by its external-send API key. Not part of the core
    /// contract; only the `/integrations` surface uses it.
    pub async fn tenant_by_api_key(&self, api_key: &str) -> CoreResult<Option<TenantRecord>> {
        let model = organization::Entity::find()
            .filter(organization::Column::ApiKey.eq(api_key))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }
}

#[async_trait]
impl TenantStore for PgStore {
    async fn by_id(&self, id: Uuid) -> CoreResult<Option<TenantRecord>> {
        let model = organization::Entity::find_by_id(id)
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }

    async fn by_phone_number_id(&self, phone_number_id: &str) -> CoreResult<Option<TenantRecord>> {
        let model = organization::Entity::find()
            .filter(organization::Column::PhoneNumberId.eq(phone_number_id))
            .filter(organization::Column::SubscriptionStatus.eq("active"))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }
}
