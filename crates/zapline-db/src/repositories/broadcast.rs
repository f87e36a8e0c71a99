//! Broadcast store: lifecycle transitions, recipients, atomic counters

use super::PgStore;
use crate::entities::{broadcast, broadcast_recipient};
use crate::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use uuid::Uuid;
use zapline_core::model::{
    BroadcastRecipientRecord, BroadcastRecord, BroadcastStatus, MessageStatus,
};
use zapline_core::store::BroadcastStore;
use zapline_core::CoreResult;

async fn increment_counter(
    store: &PgStore,
    broadcast_id: Uuid,
    column: broadcast::Column,
) -> CoreResult<()> {
    broadcast::Entity::update_many()
        .col_expr(column, Expr::col(column).add(1))
        .col_expr(broadcast::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(broadcast::Column::Id.eq(broadcast_id))
        .exec(store.db())
        .await
        .map_err(DatabaseError::from)?;
    Ok(())
}

/// Conditional recipient-status update; returns whether a row changed.
async fn advance_recipient(
    store: &PgStore,
    recipient_id: Uuid,
    from: &[&str],
    to: MessageStatus,
    error: Option<&str>,
) -> CoreResult<bool> {
    let mut update = broadcast_recipient::Entity::update_many()
        .col_expr(
            broadcast_recipient::Column::Status,
            Expr::value(to.as_str()),
        )
        .col_expr(
            broadcast_recipient::Column::UpdatedAt,
            Expr::value(Utc::now()),
        )
        .filter(broadcast_recipient::Column::Id.eq(recipient_id))
        .filter(broadcast_recipient::Column::Status.is_in(from.to_vec()));
    if let Some(error) = error {
        update = update.col_expr(broadcast_recipient::Column::Error, Expr::value(error));
    }
    let result = update.exec(store.db()).await.map_err(DatabaseError::from)?;
    Ok(result.rows_affected > 0)
}

#[async_trait]
impl BroadcastStore for PgStore {
    async fn get(&self, tenant_id: Uuid, id: Uuid) -> CoreResult<Option<BroadcastRecord>> {
        let model = broadcast::Entity::find_by_id(id)
            .filter(broadcast::Column::OrganizationId.eq(tenant_id))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[BroadcastStatus],
        to: BroadcastStatus,
        at: DateTime<Utc>,
    ) -> CoreResult<bool> {
        let from_strs: Vec<&str> = from.iter().map(BroadcastStatus::as_str).collect();
        let mut update = broadcast::Entity::update_many()
            .col_expr(broadcast::Column::Status, Expr::value(to.as_str()))
            .col_expr(broadcast::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(broadcast::Column::Id.eq(id))
            .filter(broadcast::Column::Status.is_in(from_strs));
        match to {
            BroadcastStatus::Processing => {
                update = update.col_expr(broadcast::Column::StartedAt, Expr::value(at));
            }
            BroadcastStatus::Completed | BroadcastStatus::Failed => {
                update = update.col_expr(broadcast::Column::CompletedAt, Expr::value(at));
            }
            _ => {}
        }
        let result = update.exec(self.db()).await.map_err(DatabaseError::from)?;
        Ok(result.rows_affected > 0)
    }

    async fn status(&self, id: Uuid) -> CoreResult<Option<BroadcastStatus>> {
        let model = broadcast::Entity::find_by_id(id)
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.and_then(|m| BroadcastStatus::parse(&m.status)))
    }

    async fn recipients(&self, broadcast_id: Uuid) -> CoreResult<Vec<BroadcastRecipientRecord>> {
        let models = broadcast_recipient::Entity::find()
            .filter(broadcast_recipient::Column::BroadcastId.eq(broadcast_id))
            .order_by_asc(broadcast_recipient::Column::Phone)
            .all(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(models
            .iter()
            .map(broadcast_recipient::Model::to_record)
            .collect())
    }

    async fn mark_recipient_sent(
        &self,
        recipient_id: Uuid,
        provider_message_id: &str,
    ) -> CoreResult<()> {
        let result = broadcast_recipient::Entity::update_many()
            .col_expr(broadcast_recipient::Column::Status, Expr::value("sent"))
            .col_expr(
                broadcast_recipient::Column::ProviderMessageId,
                Expr::value(provider_message_id),
            )
            .col_expr(
                broadcast_recipient::Column::UpdatedAt,
                Expr::value(Utc::now()),
            )
            .filter(broadcast_recipient::Column::Id.eq(recipient_id))
            .filter(broadcast_recipient::Column::ProviderMessageId.is_null())
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        if result.rows_affected > 0 {
            let recipient = broadcast_recipient::Entity::find_by_id(recipient_id)
                .one(self.db())
                .await
                .map_err(DatabaseError::from)?;
            if let Some(recipient) = recipient {
                increment_counter(self, recipient.broadcast_id, broadcast::Column::SentCount)
                    .await?;
            }
        }
        Ok(())
    }

    async fn mark_recipient_failed(&self, recipient_id: Uuid, error: &str) -> CoreResult<()> {
        let advanced = advance_recipient(
            self,
            recipient_id,
            &["pending"],
            MessageStatus::Failed,
            Some(error),
        )
        .await?;
        if advanced {
            let recipient = broadcast_recipient::Entity::find_by_id(recipient_id)
                .one(self.db())
                .await
                .map_err(DatabaseError::from)?;
            if let Some(recipient) = recipient {
                increment_counter(self, recipient.broadcast_id, broadcast::Column::FailedCount)
                    .await?;
            }
        }
        Ok(())
    }

    async fn find_recipient_by_provider_id(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
    ) -> CoreResult<Option<(BroadcastRecipientRecord, BroadcastRecord)>> {
        let Some(recipient) = broadcast_recipient::Entity::find()
            .filter(broadcast_recipient::Column::OrganizationId.eq(tenant_id))
            .filter(broadcast_recipient::Column::ProviderMessageId.eq(provider_message_id))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?
        else {
            return Ok(None);
        };
        let Some(broadcast_model) = broadcast::Entity::find_by_id(recipient.broadcast_id)
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?
        else {
            return Ok(None);
        };
        Ok(Some((recipient.to_record(), broadcast_model.to_record())))
    }

    async fn advance_recipient_status(
        &self,
        recipient_id: Uuid,
        status: MessageStatus,
        error: Option<&str>,
    ) -> CoreResult<bool> {
        let broadcast_id = match broadcast_recipient::Entity::find_by_id(recipient_id)
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?
        {
            Some(recipient) => recipient.broadcast_id,
            None => return Ok(false),
        };

        match status {
            MessageStatus::Delivered => {
                let advanced = advance_recipient(
                    self,
                    recipient_id,
                    &["pending", "sent"],
                    MessageStatus::Delivered,
                    error,
                )
                .await?;
                if advanced {
                    increment_counter(self, broadcast_id, broadcast::Column::DeliveredCount)
                        .await?;
                }
                Ok(advanced)
            }
            MessageStatus::Read => {
                // Read arriving after delivered counts once; read arriving
                // before delivered implies delivery and counts both.
                if advance_recipient(
                    self,
                    recipient_id,
                    &["delivered"],
                    MessageStatus::Read,
                    error,
                )
                .await?
                {
                    increment_counter(self, broadcast_id, broadcast::Column::ReadCount).await?;
                    return Ok(true);
                }
                if advance_recipient(
                    self,
                    recipient_id,
                    &["pending", "sent"],
                    MessageStatus::Read,
                    error,
                )
                .await?
                {
                    increment_counter(self, broadcast_id, broadcast::Column::DeliveredCount)
                        .await?;
                    increment_counter(self, broadcast_id, broadcast::Column::ReadCount).await?;
                    return Ok(true);
                }
                Ok(false)
            }
            MessageStatus::Failed => {
                let advanced = advance_recipient(
                    self,
                    recipient_id,
                    &["pending", "sent", "delivered"],
                    MessageStatus::Failed,
                    error,
                )
                .await?;
                if advanced {
                    increment_counter(self, broadcast_id, broadcast::Column::FailedCount).await?;
                }
                Ok(advanced)
            }
            _ => Ok(false),
        }
    }

    async fn increment_replied(&self, broadcast_id: Uuid) -> CoreResult<()> {
        increment_counter(self, broadcast_id, broadcast::Column::RepliedCount).await
    }

    async fn recent_broadcast_for_phone(
        &self,
        tenant_id: Uuid,
        phone: &str,
        within: Duration,
    ) -> CoreResult<Option<BroadcastRecord>> {
        let recipients = broadcast_recipient::Entity::find()
            .filter(broadcast_recipient::Column::OrganizationId.eq(tenant_id))
            .filter(broadcast_recipient::Column::Phone.eq(phone))
            .all(self.db())
            .await
            .map_err(DatabaseError::from)?;
        if recipients.is_empty() {
            return Ok(None);
        }
        let broadcast_ids: Vec<Uuid> = recipients.iter().map(|r| r.broadcast_id).collect();
        let cutoff = Utc::now() - within;
        let model = broadcast::Entity::find()
            .filter(broadcast::Column::Id.is_in(broadcast_ids))
            .filter(broadcast::Column::StartedAt.gte(cutoff))
            .order_by_desc(broadcast::Column::StartedAt)
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }

    async fn due_scheduled(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<BroadcastRecord>> {
        let models = broadcast::Entity::find()
            .filter(broadcast::Column::Status.eq("scheduled"))
            .filter(broadcast::Column::ScheduledAt.lte(cutoff))
            .all(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(models.iter().map(broadcast::Model::to_record).collect())
    }
}
