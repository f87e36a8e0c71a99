//! Scheduled notification store

use super::PgStore;
use crate::entities::scheduled_notification;
use crate::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use uuid::Uuid;
use zapline_core::model::NotificationRecord;
use zapline_core::store::NotificationStore;
use zapline_core::CoreResult;

#[async_trait]
impl NotificationStore for PgStore {
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<NotificationRecord>> {
        let models = scheduled_notification::Entity::find()
            .filter(scheduled_notification::Column::Status.eq("pending"))
            .filter(scheduled_notification::Column::ScheduledAt.lte(now))
            .order_by_asc(scheduled_notification::Column::ScheduledAt)
            .limit(limit as u64)
            .all(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(models
            .iter()
            .map(scheduled_notification::Model::to_record)
            .collect())
    }

    async fn mark_sent(&self, id: Uuid) -> CoreResult<()> {
        scheduled_notification::Entity::update_many()
            .col_expr(scheduled_notification::Column::Status, Expr::value("sent"))
            .col_expr(
                scheduled_notification::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(scheduled_notification::Column::Id.eq(id))
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> CoreResult<()> {
        scheduled_notification::Entity::update_many()
            .col_expr(scheduled_notification::Column::Status, Expr::value("failed"))
            .col_expr(scheduled_notification::Column::Error, Expr::value(error))
            .col_expr(
                scheduled_notification::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(scheduled_notification::Column::Id.eq(id))
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }
}
