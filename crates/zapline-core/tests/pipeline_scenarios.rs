//! End-to-end scenarios over the in-memory stores: webhook idempotency,
//! broadcast status reconciliation, and dispatcher start/cancel laws.

use chrono::Utc;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use zapline_core::broadcast::BroadcastDispatcher;
use zapline_core::errors::CoreResult;
use zapline_core::forward::ExternalForwarder;
use zapline_core::ingest::{AutomationHook, IngestPipeline};
use zapline_core::model::{
    BroadcastCounters, BroadcastRecipientRecord, BroadcastRecord, BroadcastStatus, ContactRecord,
    ConversationRecord, MessageStatus, SubscriptionStatus, TenantRecord,
};
use zapline_core::outbound::MessageSender;
use zapline_core::realtime::NullPublisher;
use zapline_core::store::memory::MemoryStore;
use zapline_core::store::{BroadcastStore, InboxStore};
use zapline_whatsapp::webhook::sign_body;
use zapline_whatsapp::{CloudApiClient, MessageEnvelope, SendOutcome};

fn tenant() -> TenantRecord {
    TenantRecord {
        id: Uuid::new_v4(),
        name: "Acme".to_string(),
        access_token: "token-1".to_string(),
        phone_number_id: "106540352242922".to_string(),
        business_account_id: "2033".to_string(),
        display_phone_number: "15550001111".to_string(),
        verify_token: "verify-1".to_string(),
        external_webhook_url: None,
        external_webhook_secret: None,
        subscription: SubscriptionStatus::Active,
    }
}

/// Automation hook that counts invocations.
#[derive(Default)]
struct CountingAutomation {
    invocations: Mutex<usize>,
}

#[async_trait::async_trait]
impl AutomationHook for CountingAutomation {
    async fn handle_inbound(
        &self,
        _tenant: &TenantRecord,
        _contact: &ContactRecord,
        _conversation: &ConversationRecord,
        _message: &zapline_whatsapp::InboundMessage,
        _record: &zapline_core::model::MessageRecord,
    ) -> CoreResult<()> {
        *self.invocations.lock().unwrap() += 1;
        Ok(())
    }
}

/// Sender that fabricates provider ids without any network.
struct FakeSender {
    sent: Mutex<Vec<String>>,
}

impl FakeSender {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl MessageSender for FakeSender {
    async fn send(
        &self,
        _tenant: &TenantRecord,
        to: &str,
        _envelope: &MessageEnvelope,
    ) -> CoreResult<SendOutcome> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(to.to_string());
        Ok(SendOutcome {
            provider_message_id: format!("wamid.p{}", sent.len()),
        })
    }
}

fn pipeline(
    store: Arc<MemoryStore>,
    automation: Arc<CountingAutomation>,
) -> IngestPipeline {
    IngestPipeline::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(NullPublisher),
        Arc::new(CloudApiClient::new("v19.0").unwrap()),
        ExternalForwarder::new(),
        automation,
        false,
    )
}

fn inbound_text_envelope(tenant: &TenantRecord, wamid: &str, from: &str, body: &str) -> String {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": tenant.display_phone_number,
                        "phone_number_id": tenant.phone_number_id,
                    },
                    "contacts": [{ "profile": { "name": "Maria" }, "wa_id": from }],
                    "messages": [{
                        "from": from,
                        "id": wamid,
                        "timestamp": "1714000000",
                        "type": "text",
                        "text": { "body": body }
                    }]
                }
            }]
        }]
    })
    .to_string()
}

fn status_envelope(tenant: &TenantRecord, wamid: &str, status: &str) -> String {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": tenant.display_phone_number,
                        "phone_number_id": tenant.phone_number_id,
                    },
                    "statuses": [{
                        "id": wamid,
                        "status": status,
                        "timestamp": "1714000100",
                        "recipient_id": "911234500001"
                    }]
                }
            }]
        }]
    })
    .to_string()
}

fn broadcast_with_recipients(
    tenant: &TenantRecord,
    status: BroadcastStatus,
    phones: &[&str],
) -> (BroadcastRecord, Vec<BroadcastRecipientRecord>) {
    let broadcast = BroadcastRecord {
        id: Uuid::new_v4(),
        tenant_id: tenant.id,
        name: "promo".to_string(),
        template_name: "promo_may".to_string(),
        template_language: "en_US".to_string(),
        header_media_id: None,
        header_media_type: None,
        status,
        counters: BroadcastCounters {
            total: phones.len() as i32,
            ..Default::default()
        },
        chatbot_enabled: true,
        scheduled_at: None,
        started_at: None,
        completed_at: None,
    };
    let recipients = phones
        .iter()
        .map(|phone| BroadcastRecipientRecord {
            id: Uuid::new_v4(),
            broadcast_id: broadcast.id,
            tenant_id: tenant.id,
            phone: phone.to_string(),
            variables: json!({ "1": "Friend" }),
            provider_message_id: None,
            status: MessageStatus::Pending,
            error: None,
        })
        .collect();
    (broadcast, recipients)
}

#[tokio::test]
async fn scheduler_wakes_due_broadcasts_with_grace() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());

    // Scheduled 20 seconds in the future: inside the ≥30 s grace window.
    let (mut broadcast, recipients) =
        broadcast_with_recipients(&tenant, BroadcastStatus::Scheduled, &["911234500001"]);
    broadcast.scheduled_at = Some(Utc::now() + chrono::Duration::seconds(20));
    let broadcast_id = broadcast.id;
    store.add_broadcast(broadcast, recipients);

    let sender = Arc::new(FakeSender::new());
    let dispatcher = Arc::new(
        BroadcastDispatcher::new(
            store.clone(),
            store.clone(),
            store.clone(),
            sender.clone(),
            Arc::new(NullPublisher),
        )
        .with_batching(50, Duration::ZERO),
    );
    let scheduler = zapline_core::scheduler::Scheduler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        dispatcher,
        sender,
    );

    let stats = scheduler.tick(Utc::now()).await.unwrap();
    assert_eq!(stats.broadcasts_started, 1);
    assert_eq!(
        store.broadcast(broadcast_id).unwrap().status,
        BroadcastStatus::Completed
    );
}

#[tokio::test]
async fn scheduler_dispatches_due_notifications() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());

    let due_id = Uuid::new_v4();
    let future_id = Uuid::new_v4();
    for (id, offset_secs) in [(due_id, -60i64), (future_id, 3600)] {
        store.add_notification(zapline_core::model::NotificationRecord {
            id,
            tenant_id: tenant.id,
            external_id: format!("cart-{id}"),
            phone: "911234500001".to_string(),
            template_name: "abandoned_cart".to_string(),
            template_language: "en".to_string(),
            payload: json!({ "variables": ["Maria", "2 items"] }),
            status: zapline_core::model::NotificationStatus::Pending,
            scheduled_at: Utc::now() + chrono::Duration::seconds(offset_secs),
            error: None,
        });
    }

    let sender = Arc::new(FakeSender::new());
    let dispatcher = Arc::new(BroadcastDispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        sender.clone(),
        Arc::new(NullPublisher),
    ));
    let scheduler = zapline_core::scheduler::Scheduler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        dispatcher,
        sender.clone(),
    );

    let stats = scheduler.tick(Utc::now()).await.unwrap();
    assert_eq!(stats.notifications_sent, 1);
    assert_eq!(stats.notifications_failed, 0);
    assert_eq!(sender.sent.lock().unwrap().len(), 1);

    assert_eq!(
        store.notification(due_id).unwrap().status,
        zapline_core::model::NotificationStatus::Sent
    );
    assert_eq!(
        store.notification(future_id).unwrap().status,
        zapline_core::model::NotificationStatus::Pending
    );
}

#[tokio::test]
async fn duplicate_webhook_ingests_once() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());
    let automation = Arc::new(CountingAutomation::default());
    let pipeline = pipeline(store.clone(), automation.clone());

    let body = inbound_text_envelope(&tenant, "wamid.X", "911234500001", "hello");
    let signature = sign_body(&tenant.access_token, body.as_bytes());

    let first = pipeline
        .process(None, body.as_bytes(), Some(&signature))
        .await
        .unwrap();
    assert_eq!(first.messages_ingested, 1);

    let second = pipeline
        .process(None, body.as_bytes(), Some(&signature))
        .await
        .unwrap();
    assert_eq!(second.messages_ingested, 0);
    assert_eq!(second.duplicates, 1);

    // One row, one unread increment, one interpreter invocation.
    assert_eq!(store.messages().len(), 1);
    let contact = store
        .find_contact_by_phone(tenant.id, "911234500001")
        .await
        .unwrap()
        .unwrap();
    let conversation = store.conversation_for_contact(contact.id).unwrap();
    assert_eq!(conversation.unread_count, 1);
    assert_eq!(conversation.last_preview.as_deref(), Some("hello"));
    assert_eq!(*automation.invocations.lock().unwrap(), 1);
}

#[tokio::test]
async fn bad_signature_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());
    let pipeline = pipeline(store.clone(), Arc::new(CountingAutomation::default()));

    let body = inbound_text_envelope(&tenant, "wamid.Y", "911234500001", "hi");
    let mut signature = sign_body(&tenant.access_token, body.as_bytes());
    // Flip the last hex digit.
    let flipped = if signature.ends_with('0') { "1" } else { "0" };
    signature.replace_range(signature.len() - 1.., flipped);

    let result = pipeline
        .process(None, body.as_bytes(), Some(&signature))
        .await;
    assert!(result.is_err());
    assert!(store.messages().is_empty());
}

#[tokio::test]
async fn self_message_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());
    let automation = Arc::new(CountingAutomation::default());
    let pipeline = pipeline(store.clone(), automation.clone());

    // Same digits as the tenant's display number, different formatting.
    let body = inbound_text_envelope(&tenant, "wamid.self", "+1 555 000 1111", "loop");
    let signature = sign_body(&tenant.access_token, body.as_bytes());

    let summary = pipeline
        .process(None, body.as_bytes(), Some(&signature))
        .await
        .unwrap();
    assert_eq!(summary.self_messages_dropped, 1);
    assert!(store.messages().is_empty());
    assert_eq!(*automation.invocations.lock().unwrap(), 0);
}

#[tokio::test]
async fn status_reconciliation_counts_out_of_order_reads() {
    // Scenario: two recipients; A gets delivered, B gets read before its
    // delivered. Counters must end at sent=2, delivered=2, read=1.
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());

    let (broadcast, recipients) = broadcast_with_recipients(
        &tenant,
        BroadcastStatus::Pending,
        &["911234500001", "911234500002"],
    );
    let broadcast_id = broadcast.id;
    store.add_broadcast(broadcast, recipients);

    let sender = Arc::new(FakeSender::new());
    let dispatcher = BroadcastDispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        sender,
        Arc::new(NullPublisher),
    )
    .with_batching(50, Duration::ZERO);
    dispatcher.start(tenant.id, broadcast_id).await.unwrap();

    let after_send = store.broadcast(broadcast_id).unwrap();
    assert_eq!(after_send.status, BroadcastStatus::Completed);
    assert_eq!(after_send.counters.sent, 2);

    // Recipients are processed in phone order, so pA went to ...01.
    let recipients = store.recipients(broadcast_id).await.unwrap();
    let wamid_a = recipients[0].provider_message_id.clone().unwrap();
    let wamid_b = recipients[1].provider_message_id.clone().unwrap();

    let pipeline = pipeline(store.clone(), Arc::new(CountingAutomation::default()));
    for (wamid, status) in [(&wamid_a, "delivered"), (&wamid_b, "read")] {
        let body = status_envelope(&tenant, wamid, status);
        let signature = sign_body(&tenant.access_token, body.as_bytes());
        pipeline
            .process(None, body.as_bytes(), Some(&signature))
            .await
            .unwrap();
    }

    let reconciled = store.broadcast(broadcast_id).unwrap();
    assert_eq!(reconciled.counters.sent, 2);
    assert_eq!(reconciled.counters.delivered, 2);
    assert_eq!(reconciled.counters.read, 1);
    assert_eq!(reconciled.counters.failed, 0);

    let recipients = store.recipients(broadcast_id).await.unwrap();
    assert_eq!(recipients[0].status, MessageStatus::Delivered);
    assert_eq!(recipients[1].status, MessageStatus::Read);
}

#[tokio::test]
async fn replayed_status_does_not_double_count() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());

    let (broadcast, recipients) =
        broadcast_with_recipients(&tenant, BroadcastStatus::Pending, &["911234500001"]);
    let broadcast_id = broadcast.id;
    store.add_broadcast(broadcast, recipients);

    let dispatcher = BroadcastDispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FakeSender::new()),
        Arc::new(NullPublisher),
    )
    .with_batching(50, Duration::ZERO);
    dispatcher.start(tenant.id, broadcast_id).await.unwrap();

    let wamid = store.recipients(broadcast_id).await.unwrap()[0]
        .provider_message_id
        .clone()
        .unwrap();

    let pipeline = pipeline(store.clone(), Arc::new(CountingAutomation::default()));
    let body = status_envelope(&tenant, &wamid, "delivered");
    let signature = sign_body(&tenant.access_token, body.as_bytes());
    for _ in 0..2 {
        pipeline
            .process(None, body.as_bytes(), Some(&signature))
            .await
            .unwrap();
    }

    let counters = store.broadcast(broadcast_id).unwrap().counters;
    assert_eq!(counters.delivered, 1);
}

#[tokio::test]
async fn cancelled_broadcast_never_starts() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());

    let (broadcast, recipients) =
        broadcast_with_recipients(&tenant, BroadcastStatus::Pending, &["911234500001"]);
    let broadcast_id = broadcast.id;
    store.add_broadcast(broadcast, recipients);

    // Cancel before start.
    assert!(store
        .transition(
            broadcast_id,
            &[BroadcastStatus::Pending, BroadcastStatus::Scheduled],
            BroadcastStatus::Cancelled,
            Utc::now(),
        )
        .await
        .unwrap());

    let sender = Arc::new(FakeSender::new());
    let dispatcher = BroadcastDispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        sender.clone(),
        Arc::new(NullPublisher),
    )
    .with_batching(50, Duration::ZERO);

    // Start attempts after cancellation are no-ops, repeatedly.
    dispatcher.start(tenant.id, broadcast_id).await.unwrap();
    dispatcher.start(tenant.id, broadcast_id).await.unwrap();

    assert!(sender.sent.lock().unwrap().is_empty());
    assert_eq!(
        store.broadcast(broadcast_id).unwrap().status,
        BroadcastStatus::Cancelled
    );
}

#[tokio::test]
async fn start_is_idempotent_while_processing() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());

    let (broadcast, recipients) =
        broadcast_with_recipients(&tenant, BroadcastStatus::Pending, &["911234500001"]);
    let broadcast_id = broadcast.id;
    store.add_broadcast(broadcast, recipients);

    let sender = Arc::new(FakeSender::new());
    let dispatcher = BroadcastDispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        sender.clone(),
        Arc::new(NullPublisher),
    )
    .with_batching(50, Duration::ZERO);

    dispatcher.start(tenant.id, broadcast_id).await.unwrap();
    // Completed now; a second start must not resend.
    dispatcher.start(tenant.id, broadcast_id).await.unwrap();

    assert_eq!(sender.sent.lock().unwrap().len(), 1);
    assert_eq!(store.broadcast(broadcast_id).unwrap().counters.sent, 1);
}

#[tokio::test]
async fn reply_to_broadcast_attributes_conversation() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());

    let (broadcast, recipients) =
        broadcast_with_recipients(&tenant, BroadcastStatus::Pending, &["911234500001"]);
    let broadcast_id = broadcast.id;
    store.add_broadcast(broadcast, recipients);

    let dispatcher = BroadcastDispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FakeSender::new()),
        Arc::new(NullPublisher),
    )
    .with_batching(50, Duration::ZERO);
    dispatcher.start(tenant.id, broadcast_id).await.unwrap();

    let automation = Arc::new(CountingAutomation::default());
    let pipeline = pipeline(store.clone(), automation.clone());
    let body = inbound_text_envelope(&tenant, "wamid.reply1", "911234500001", "interested!");
    let signature = sign_body(&tenant.access_token, body.as_bytes());
    pipeline
        .process(None, body.as_bytes(), Some(&signature))
        .await
        .unwrap();

    let contact = store
        .find_contact_by_phone(tenant.id, "911234500001")
        .await
        .unwrap()
        .unwrap();
    let conversation = store.conversation_for_contact(contact.id).unwrap();
    assert_eq!(conversation.broadcast_id, Some(broadcast_id));
    assert_eq!(store.broadcast(broadcast_id).unwrap().counters.replied, 1);
    // chatbot_enabled is true, so the interpreter still ran.
    assert_eq!(*automation.invocations.lock().unwrap(), 1);
}

#[tokio::test]
async fn chatbot_disabled_broadcast_suppresses_automation() {
    let store = Arc::new(MemoryStore::new());
    let tenant = tenant();
    store.add_tenant(tenant.clone());

    let (mut broadcast, recipients) =
        broadcast_with_recipients(&tenant, BroadcastStatus::Pending, &["911234500001"]);
    broadcast.chatbot_enabled = false;
    let broadcast_id = broadcast.id;
    store.add_broadcast(broadcast, recipients);

    let dispatcher = BroadcastDispatcher::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(FakeSender::new()),
        Arc::new(NullPublisher),
    )
    .with_batching(50, Duration::ZERO);
    dispatcher.start(tenant.id, broadcast_id).await.unwrap();

    let automation = Arc::new(CountingAutomation::default());
    let pipeline = pipeline(store.clone(), automation.clone());
    let body = inbound_text_envelope(&tenant, "wamid.reply2", "911234500001", "stop");
    let signature = sign_body(&tenant.access_token, body.as_bytes());
    pipeline
        .process(None, body.as_bytes(), Some(&signature))
        .await
        .unwrap();

    assert_eq!(*automation.invocations.lock().unwrap(), 0);
}
