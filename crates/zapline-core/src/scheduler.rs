//! Minute-resolution scheduler
//!
//! One tick wakes due scheduled broadcasts and dispatches due deferred
//! notifications. The tick itself is a plain async function so the worker
//! loop in `zapline-api` (and the tests here) can drive it with any clock.

use crate::broadcast::BroadcastDispatcher;
use crate::errors::CoreResult;
use crate::model::NotificationRecord;
use crate::outbound::MessageSender;
use crate::store::{BroadcastStore, NotificationStore, TenantStore};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use zapline_whatsapp::{MessageEnvelope, TemplateMessage, TemplateComponent, TemplateParameter};

/// Broadcasts scheduled up to this far into the future still fire on the
/// current tick, tolerating clock skew at creation time.
const SCHEDULE_GRACE: Duration = Duration::seconds(30);

/// Notifications dispatched per tick.
const NOTIFICATION_BATCH: usize = 50;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub broadcasts_started: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

pub struct Scheduler {
    tenants: Arc<dyn TenantStore>,
    broadcasts: Arc<dyn BroadcastStore>,
    notifications: Arc<dyn NotificationStore>,
    dispatcher: Arc<BroadcastDispatcher>,
    sender: Arc<dyn MessageSender>,
}

impl Scheduler {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        broadcasts: Arc<dyn BroadcastStore>,
        notifications: Arc<dyn NotificationStore>,
        dispatcher: Arc<BroadcastDispatcher>,
        sender: Arc<dyn MessageSender>,
    ) -> Self {
        Self {
            tenants,
            broadcasts,
            notifications,
            dispatcher,
            sender,
        }
    }

    /// One scheduler pass at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> CoreResult<TickStats> {
        let mut stats = TickStats::default();

        for broadcast in self.broadcasts.due_scheduled(now + SCHEDULE_GRACE).await? {
            info!(broadcast = %broadcast.id, "waking scheduled broadcast");
            stats.broadcasts_started += 1;
            if let Err(err) = self
                .dispatcher
                .start(broadcast.tenant_id, broadcast.id)
                .await
            {
                warn!(broadcast = %broadcast.id, "scheduled broadcast failed: {err}");
            }
        }

        for notification in self.notifications.due(now, NOTIFICATION_BATCH).await? {
            match self.dispatch_notification(&notification).await {
                Ok(()) => {
                    self.notifications.mark_sent(notification.id).await?;
                    stats.notifications_sent += 1;
                }
                Err(err) => {
                    warn!(
                        notification = %notification.id,
                        external_id = %notification.external_id,
                        "notification failed: {err}"
                    );
                    self.notifications
                        .mark_failed(notification.id, &err.to_string())
                        .await?;
                    stats.notifications_failed += 1;
                }
            }
        }

        Ok(stats)
    }

    async fn dispatch_notification(&self, notification: &NotificationRecord) -> CoreResult<()> {
        let tenant = self
            .tenants
            .by_id(notification.tenant_id)
            .await?
            .ok_or_else(|| {
                crate::errors::CoreError::not_found(
                    "organization".to_string(),
                    notification.tenant_id.to_string(),
                )
            })?;

        // The payload carries positional body parameters under "variables".
        let body_values: Vec<String> = notification
            .payload
            .get("variables")
            .and_then(|v| v.as_array())
            .map(|values| {
                values
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let mut components = Vec::new();
        if !body_values.is_empty() {
            components.push(TemplateComponent::body(
                body_values.iter().map(TemplateParameter::text).collect(),
            ));
        }
        let envelope = MessageEnvelope::Template {
            template: TemplateMessage::new(
                notification.template_name.clone(),
                notification.template_language.clone(),
            )
            .with_components(components),
        };

        self.sender
            .send(&tenant, &notification.phone, &envelope)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SCHEDULE_GRACE;

    #[test]
    fn grace_is_at_least_thirty_seconds() {
        assert!(SCHEDULE_GRACE.num_seconds() >= 30);
    }
}
