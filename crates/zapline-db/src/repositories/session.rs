//! Flow session store

use super::PgStore;
use crate::entities::flow_session;
use crate::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::Set;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;
use zapline_core::model::SessionRecord;
use zapline_core::store::SessionStore;
use zapline_core::CoreResult;

#[async_trait]
impl SessionStore for PgStore {
    async fn find(&self, tenant_id: Uuid, contact_id: Uuid) -> CoreResult<Option<SessionRecord>> {
        let model = flow_session::Entity::find()
            .filter(flow_session::Column::OrganizationId.eq(tenant_id))
            .filter(flow_session::Column::ContactId.eq(contact_id))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }

    async fn save(&self, session: &SessionRecord) -> CoreResult<()> {
        let active = flow_session::ActiveModel {
            id: Set(session.id),
            organization_id: Set(session.tenant_id),
            contact_id: Set(session.contact_id),
            flow_id: Set(session.flow_id),
            current_node_id: Set(session.current_node_id.clone()),
            variables: Set(session.variables.clone()),
            waiting_on: Set(session.waiting_on.clone()),
            last_interaction_at: Set(session.last_interaction_at),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        // The (organization_id, contact_id) unique index enforces one
        // session per contact; a racing creator's row gets overwritten.
        flow_session::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    flow_session::Column::OrganizationId,
                    flow_session::Column::ContactId,
                ])
                .update_columns([
                    flow_session::Column::FlowId,
                    flow_session::Column::CurrentNodeId,
                    flow_session::Column::Variables,
                    flow_session::Column::WaitingOn,
                    flow_session::Column::LastInteractionAt,
                    flow_session::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn delete(&self, tenant_id: Uuid, contact_id: Uuid) -> CoreResult<()> {
        flow_session::Entity::delete_many()
            .filter(flow_session::Column::OrganizationId.eq(tenant_id))
            .filter(flow_session::Column::ContactId.eq(contact_id))
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn delete_idle_since(&self, cutoff: DateTime<Utc>) -> CoreResult<u64> {
        let result = flow_session::Entity::delete_many()
            .filter(flow_session::Column::LastInteractionAt.lt(cutoff))
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(result.rows_affected)
    }
}
