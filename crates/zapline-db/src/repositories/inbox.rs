//! Inbox store: contacts, conversations, messages

use super::PgStore;
use crate::entities::{contact, conversation, message};
use crate::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ColumnTrait, Condition, DbErr, EntityTrait, QueryFilter};
use uuid::Uuid;
use zapline_core::model::{
    ContactRecord, ConversationRecord, Direction, InsertOutcome, MessageRecord, MessageStatus,
    NewMessage,
};
use zapline_core::store::InboxStore;
use zapline_core::{CoreError, CoreResult};

const LIVE_STATUSES: [&str; 2] = ["open", "pending"];

/// Statuses a message may currently hold for `target` to be an advance.
fn advancing_from(target: MessageStatus) -> Vec<&'static str> {
    match target {
        MessageStatus::Sent => vec!["pending"],
        MessageStatus::Delivered => vec!["pending", "sent"],
        MessageStatus::Read => vec!["pending", "sent", "delivered"],
        MessageStatus::Failed => vec!["pending", "sent", "delivered", "read"],
        MessageStatus::Pending => vec![],
    }
}

fn message_active(record: &NewMessage) -> message::ActiveModel {
    message::ActiveModel {
        id: Set(Uuid::new_v4()),
        organization_id: Set(record.tenant_id),
        conversation_id: Set(record.conversation_id),
        direction: Set(record.direction.as_str().to_string()),
        kind: Set(record.kind.as_str().to_string()),
        body: Set(record.body.clone()),
        caption: Set(record.caption.clone()),
        media_url: Set(record.media_url.clone()),
        media_id: Set(record.media_id.clone()),
        media_mime: Set(record.media_mime.clone()),
        media_size: Set(record.media_size),
        filename: Set(record.filename.clone()),
        status: Set(record.status.as_str().to_string()),
        provider_message_id: Set(record.provider_message_id.clone()),
        error: Set(None),
        sent_at: Set(record.sent_at),
        created_at: Set(Utc::now()),
    }
}

#[async_trait]
impl InboxStore for PgStore {
    async fn upsert_contact(
        &self,
        tenant_id: Uuid,
        wa_id: &str,
        phone: &str,
        profile_name: Option<&str>,
    ) -> CoreResult<ContactRecord> {
        let existing = contact::Entity::find()
            .filter(contact::Column::OrganizationId.eq(tenant_id))
            .filter(contact::Column::WaId.eq(wa_id))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;

        if let Some(model) = existing {
            if let Some(name) = profile_name {
                if model.profile_name.as_deref() != Some(name) {
                    let mut active: contact::ActiveModel = model.clone().into();
                    active.profile_name = Set(Some(name.to_string()));
                    active.updated_at = Set(Utc::now());
                    let updated = active.update(self.db()).await.map_err(DatabaseError::from)?;
                    return Ok(updated.to_record());
                }
            }
            return Ok(model.to_record());
        }

        let active = contact::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(tenant_id),
            wa_id: Set(wa_id.to_string()),
            phone: Set(phone.to_string()),
            name: Set(None),
            profile_name: Set(profile_name.map(str::to_string)),
            email: Set(None),
            labels: Set(serde_json::json!([])),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        match active.insert(self.db()).await {
            Ok(model) => Ok(model.to_record()),
            // A concurrent webhook created it first; adopt that row.
            Err(err) if is_conflict(&err) => {
                let model = contact::Entity::find()
                    .filter(contact::Column::OrganizationId.eq(tenant_id))
                    .filter(contact::Column::WaId.eq(wa_id))
                    .one(self.db())
                    .await
                    .map_err(DatabaseError::from)?
                    .ok_or_else(|| CoreError::storage("contact vanished after conflict"))?;
                Ok(model.to_record())
            }
            Err(err) => Err(DatabaseError::from(err).into()),
        }
    }

    async fn find_contact_by_phone(
        &self,
        tenant_id: Uuid,
        phone: &str,
    ) -> CoreResult<Option<ContactRecord>> {
        let model = contact::Entity::find()
            .filter(contact::Column::OrganizationId.eq(tenant_id))
            .filter(
                Condition::any()
                    .add(contact::Column::Phone.eq(phone))
                    .add(contact::Column::WaId.eq(phone)),
            )
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }

    async fn open_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<ConversationRecord> {
        if let Some(existing) = self.find_live_conversation(tenant_id, contact_id).await? {
            return Ok(existing);
        }
        let active = conversation::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(tenant_id),
            contact_id: Set(contact_id),
            status: Set("pending".to_string()),
            assigned_agent_id: Set(None),
            unread_count: Set(0),
            last_message_at: Set(None),
            last_preview: Set(None),
            broadcast_id: Set(None),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        match active.insert(self.db()).await {
            Ok(model) => Ok(model.to_record()),
            // The partial unique index fired; a racing insert won.
            Err(err) if is_conflict(&err) => self
                .find_live_conversation(tenant_id, contact_id)
                .await?
                .ok_or_else(|| CoreError::storage("conversation vanished after conflict")),
            Err(err) => Err(DatabaseError::from(err).into()),
        }
    }

    async fn find_live_conversation(
        &self,
        tenant_id: Uuid,
        contact_id: Uuid,
    ) -> CoreResult<Option<ConversationRecord>> {
        let model = conversation::Entity::find()
            .filter(conversation::Column::OrganizationId.eq(tenant_id))
            .filter(conversation::Column::ContactId.eq(contact_id))
            .filter(conversation::Column::Status.is_in(LIVE_STATUSES))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }

    async fn conversation(&self, id: Uuid) -> CoreResult<Option<ConversationRecord>> {
        let model = conversation::Entity::find_by_id(id)
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }

    async fn insert_incoming(&self, new_message: NewMessage) -> CoreResult<InsertOutcome> {
        let active = message_active(&new_message);
        let insert = message::Entity::insert(active)
            .on_conflict(
                OnConflict::column(message::Column::ProviderMessageId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_with_returning(self.db())
            .await;
        match insert {
            Ok(model) => Ok(InsertOutcome::Inserted(model.to_record())),
            Err(DbErr::RecordNotInserted) => Ok(InsertOutcome::Duplicate),
            Err(err) if is_conflict(&err) => Ok(InsertOutcome::Duplicate),
            Err(err) => Err(DatabaseError::from(err).into()),
        }
    }

    async fn record_outgoing(&self, new_message: NewMessage) -> CoreResult<MessageRecord> {
        let model = message_active(&new_message)
            .insert(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.to_record())
    }

    async fn apply_status(
        &self,
        tenant_id: Uuid,
        provider_message_id: &str,
        status: MessageStatus,
        error: Option<&str>,
    ) -> CoreResult<Option<MessageRecord>> {
        let from = advancing_from(status);
        if from.is_empty() {
            return Ok(None);
        }
        let mut update = message::Entity::update_many()
            .col_expr(message::Column::Status, Expr::value(status.as_str()))
            .filter(message::Column::OrganizationId.eq(tenant_id))
            .filter(message::Column::ProviderMessageId.eq(provider_message_id))
            .filter(message::Column::Status.is_in(from));
        if let Some(error) = error {
            update = update.col_expr(message::Column::Error, Expr::value(error));
        }
        let result = update.exec(self.db()).await.map_err(DatabaseError::from)?;
        if result.rows_affected == 0 {
            return Ok(None);
        }
        let model = message::Entity::find()
            .filter(message::Column::OrganizationId.eq(tenant_id))
            .filter(message::Column::ProviderMessageId.eq(provider_message_id))
            .one(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(model.map(|m| m.to_record()))
    }

    async fn touch_conversation_incoming(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        conversation::Entity::update_many()
            .col_expr(conversation::Column::LastPreview, Expr::value(preview))
            .col_expr(conversation::Column::LastMessageAt, Expr::value(at))
            .col_expr(
                conversation::Column::UnreadCount,
                Expr::col(conversation::Column::UnreadCount).add(1),
            )
            .col_expr(conversation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(conversation::Column::Id.eq(conversation_id))
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn touch_conversation_outgoing(
        &self,
        conversation_id: Uuid,
        preview: &str,
        at: DateTime<Utc>,
    ) -> CoreResult<()> {
        conversation::Entity::update_many()
            .col_expr(conversation::Column::LastPreview, Expr::value(preview))
            .col_expr(conversation::Column::LastMessageAt, Expr::value(at))
            .col_expr(conversation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(conversation::Column::Id.eq(conversation_id))
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn mark_read(
        &self,
        tenant_id: Uuid,
        conversation_id: Uuid,
        message_ids: &[Uuid],
    ) -> CoreResult<()> {
        conversation::Entity::update_many()
            .col_expr(conversation::Column::UnreadCount, Expr::value(0))
            .col_expr(conversation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(conversation::Column::Id.eq(conversation_id))
            .filter(conversation::Column::OrganizationId.eq(tenant_id))
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;

        if !message_ids.is_empty() {
            message::Entity::update_many()
                .col_expr(message::Column::Status, Expr::value("read"))
                .filter(message::Column::OrganizationId.eq(tenant_id))
                .filter(message::Column::ConversationId.eq(conversation_id))
                .filter(message::Column::Id.is_in(message_ids.to_vec()))
                .filter(message::Column::Direction.eq(Direction::In.as_str()))
                .filter(message::Column::Status.is_in(advancing_from(MessageStatus::Read)))
                .exec(self.db())
                .await
                .map_err(DatabaseError::from)?;
        }
        Ok(())
    }

    async fn attribute_broadcast(
        &self,
        conversation_id: Uuid,
        broadcast_id: Uuid,
    ) -> CoreResult<bool> {
        let result = conversation::Entity::update_many()
            .col_expr(
                conversation::Column::BroadcastId,
                Expr::value(broadcast_id),
            )
            .col_expr(conversation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(conversation::Column::Id.eq(conversation_id))
            .filter(conversation::Column::BroadcastId.is_null())
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(result.rows_affected > 0)
    }

    async fn handoff_to_agent(&self, conversation_id: Uuid) -> CoreResult<()> {
        conversation::Entity::update_many()
            .col_expr(conversation::Column::Status, Expr::value("open"))
            .col_expr(conversation::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(conversation::Column::Id.eq(conversation_id))
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }

    async fn update_contact_fields(
        &self,
        contact_id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
        labels: Option<&[String]>,
    ) -> CoreResult<()> {
        let mut update = contact::Entity::update_many()
            .col_expr(contact::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(contact::Column::Id.eq(contact_id));
        if let Some(name) = name {
            update = update.col_expr(contact::Column::Name, Expr::value(name));
        }
        if let Some(email) = email {
            update = update.col_expr(contact::Column::Email, Expr::value(email));
        }
        if let Some(labels) = labels {
            update = update.col_expr(
                contact::Column::Labels,
                Expr::value(serde_json::json!(labels)),
            );
        }
        update.exec(self.db()).await.map_err(DatabaseError::from)?;
        Ok(())
    }
}

fn is_conflict(err: &DbErr) -> bool {
    let text = err.to_string();
    text.contains("duplicate key") || text.contains("UNIQUE constraint")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_sets_are_monotone() {
        assert_eq!(advancing_from(MessageStatus::Sent), vec!["pending"]);
        assert!(advancing_from(MessageStatus::Read).contains(&"delivered"));
        assert!(!advancing_from(MessageStatus::Delivered).contains(&"read"));
        assert!(advancing_from(MessageStatus::Pending).is_empty());
    }
}
