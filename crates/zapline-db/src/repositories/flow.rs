//! Flow definition lookup

use super::PgStore;
use crate::entities::flow;
use crate::error::DatabaseError;
use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;
use zapline_core::model::FlowRecord;
use zapline_core::store::FlowStore;
use zapline_core::CoreResult;

#[async_trait]
impl FlowStore for PgStore {
    async fn enabled_flows(&self, tenant_id: Uuid) -> CoreResult<Vec<FlowRecord>> {
        let models = flow::Entity::find()
            .filter(flow::Column::OrganizationId.eq(tenant_id))
            .filter(flow::Column::Enabled.eq(true))
            .order_by_asc(flow::Column::CreatedAt)
            .all(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(models.iter().map(flow::Model::to_record).collect())
    }

    async fn flow(&self, tenant_id: Uuid, flow_id: Uuid) -> CoreResult<Option<FlowRecord>> {
        let model = flow::Entity::find_by_id(flow_id)
            .filter(flow::Column::OrganizationId.eq(tenant_id))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }
}
