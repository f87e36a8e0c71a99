//! Template mirror and quick-reply accessors
//!
//! These back the operator-facing collaborator surfaces. The template
//! mirror is refreshed from the provider's template list so broadcast
//! authoring can validate names and parameter counts without a round-trip.

use super::PgStore;
use crate::entities::{quick_reply, template};
use crate::error::DatabaseError;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveValue::Set;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::Value;
use uuid::Uuid;
use zapline_core::CoreResult;

impl PgStore {
    /// Replace the tenant's template mirror with the provider's list.
    pub async fn replace_template_mirror(
        &self,
        tenant_id: Uuid,
        templates: Vec<(String, String, Option<String>, Option<String>, Value)>,
    ) -> CoreResult<usize> {
        let count = templates.len();
        for (name, language, category, status, components) in templates {
            let active = template::ActiveModel {
                id: Set(Uuid::new_v4()),
                organization_id: Set(tenant_id),
                name: Set(name),
                language: Set(language),
                category: Set(category),
                status: Set(status),
                components: Set(components),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            template::Entity::insert(active)
                .on_conflict(
                    OnConflict::columns([
                        template::Column::OrganizationId,
                        template::Column::Name,
                    ])
                    .update_columns([
                        template::Column::Language,
                        template::Column::Category,
                        template::Column::Status,
                        template::Column::Components,
                        template::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec(self.db())
                .await
                .map_err(DatabaseError::from)?;
        }
        Ok(count)
    }

    pub async fn templates_for(&self, tenant_id: Uuid) -> CoreResult<Vec<template::Model>> {
        Ok(template::Entity::find()
            .filter(template::Column::OrganizationId.eq(tenant_id))
            .order_by_asc(template::Column::Name)
            .all(self.db())
            .await
            .map_err(DatabaseError::from)?)
    }

    pub async fn quick_replies_for(&self, tenant_id: Uuid) -> CoreResult<Vec<quick_reply::Model>> {
        Ok(quick_reply::Entity::find()
            .filter(quick_reply::Column::OrganizationId.eq(tenant_id))
            .order_by_asc(quick_reply::Column::Shortcut)
            .all(self.db())
            .await
            .map_err(DatabaseError::from)?)
    }

    /// Create or update a quick reply under the (organization, shortcut)
    /// uniqueness contract.
    pub async fn upsert_quick_reply(
        &self,
        tenant_id: Uuid,
        shortcut: &str,
        body: &str,
    ) -> CoreResult<()> {
        let active = quick_reply::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(tenant_id),
            shortcut: Set(shortcut.to_string()),
            body: Set(body.to_string()),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        };
        quick_reply::Entity::insert(active)
            .on_conflict(
                OnConflict::columns([
                    quick_reply::Column::OrganizationId,
                    quick_reply::Column::Shortcut,
                ])
                .update_columns([quick_reply::Column::Body, quick_reply::Column::UpdatedAt])
                .to_owned(),
            )
            .exec(self.db())
            .await
            .map_err(DatabaseError::from)?;
        Ok(())
    }
}
