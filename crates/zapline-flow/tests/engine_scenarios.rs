//! End-to-end interpreter scenarios over in-memory stores and a recording
//! sender: trigger-to-greet, button branching, list pagination, session
//! timeout, and the retry-on-invalid law.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use zapline_core::errors::CoreResult;
use zapline_core::ingest::AutomationHook;
use zapline_core::model::{
    ContactRecord, ConversationRecord, Direction, FlowRecord, MessageKind, MessageRecord,
    MessageStatus, SubscriptionStatus, TenantRecord,
};
use zapline_core::outbound::{MessageSender, OutboundMessenger};
use zapline_core::realtime::NullPublisher;
use zapline_core::store::memory::{DeniedSqlRunner, MemoryStore};
use zapline_core::store::{InboxStore, SessionStore};
use zapline_flow::{FlowEngine, FlowEngineConfig};
use zapline_whatsapp::{CloudApiClient, InboundMessage, MessageEnvelope, SendOutcome};

struct RecordingSender {
    sent: Mutex<Vec<(String, MessageEnvelope)>>,
}

impl RecordingSender {
    fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    fn envelopes(&self) -> Vec<(String, MessageEnvelope)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MessageSender for RecordingSender {
    async fn send(
        &self,
        _tenant: &TenantRecord,
        to: &str,
        envelope: &MessageEnvelope,
    ) -> CoreResult<SendOutcome> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), envelope.clone()));
        Ok(SendOutcome {
            provider_message_id: format!("wamid.out{}", sent.len()),
        })
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    sender: Arc<RecordingSender>,
    engine: FlowEngine,
    tenant: TenantRecord,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantRecord {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            access_token: "token".to_string(),
            phone_number_id: "10654".to_string(),
            business_account_id: "2033".to_string(),
            display_phone_number: "15550001111".to_string(),
            verify_token: "verify".to_string(),
            external_webhook_url: None,
            external_webhook_secret: None,
            subscription: SubscriptionStatus::Active,
        };
        store.add_tenant(tenant.clone());

        let sender = Arc::new(RecordingSender::new());
        let outbound = Arc::new(OutboundMessenger::new(
            sender.clone(),
            store.clone(),
            Arc::new(NullPublisher),
        ));
        let engine = FlowEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            outbound,
            Arc::new(CloudApiClient::new("v19.0").unwrap()),
            Arc::new(DeniedSqlRunner),
            FlowEngineConfig::default(),
        );
        Self {
            store,
            sender,
            engine,
            tenant,
        }
    }

    fn add_flow(
        &self,
        name: &str,
        trigger: Option<&str>,
        is_default: bool,
        timeout_secs: i64,
        definition: Value,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.store.add_flow(FlowRecord {
            id,
            tenant_id: self.tenant.id,
            name: name.to_string(),
            definition,
            trigger_keyword: trigger.map(str::to_string),
            is_default,
            enabled: true,
            session_timeout_secs: timeout_secs,
            working_hours: None,
        });
        id
    }

    async fn contact_and_conversation(&self, phone: &str) -> (ContactRecord, ConversationRecord) {
        let contact = self
            .store
            .upsert_contact(self.tenant.id, phone, phone, Some("Maria"))
            .await
            .unwrap();
        let conversation = self
            .store
            .open_conversation(self.tenant.id, contact.id)
            .await
            .unwrap();
        (contact, conversation)
    }

    async fn inbound(&self, phone: &str, payload: Value) {
        let (contact, conversation) = self.contact_and_conversation(phone).await;
        let message: InboundMessage = serde_json::from_value(payload).unwrap();
        let record = MessageRecord {
            id: Uuid::new_v4(),
            tenant_id: self.tenant.id,
            conversation_id: conversation.id,
            direction: Direction::In,
            kind: MessageKind::from_provider(&message.message_type),
            body: message.text_body().unwrap_or_default(),
            caption: None,
            media_url: None,
            media_id: message.media().and_then(|m| m.id.clone()),
            media_mime: None,
            media_size: None,
            filename: None,
            status: MessageStatus::Delivered,
            provider_message_id: Some(message.id.clone()),
            error: None,
            sent_at: Utc::now(),
        };
        self.engine
            .handle_inbound(&self.tenant, &contact, &conversation, &message, &record)
            .await
            .unwrap();
    }

    async fn inbound_text(&self, phone: &str, body: &str) {
        self.inbound(
            phone,
            json!({
                "id": format!("wamid.in{}", Uuid::new_v4()),
                "from": phone,
                "timestamp": "1714000000",
                "type": "text",
                "text": { "body": body }
            }),
        )
        .await;
    }

    async fn inbound_button_reply(&self, phone: &str, id: &str, title: &str) {
        self.inbound(
            phone,
            json!({
                "id": format!("wamid.in{}", Uuid::new_v4()),
                "from": phone,
                "timestamp": "1714000001",
                "type": "interactive",
                "interactive": {
                    "type": "button_reply",
                    "button_reply": { "id": id, "title": title }
                }
            }),
        )
        .await;
    }

    async fn inbound_list_reply(&self, phone: &str, id: &str, title: &str) {
        self.inbound(
            phone,
            json!({
                "id": format!("wamid.in{}", Uuid::new_v4()),
                "from": phone,
                "timestamp": "1714000002",
                "type": "interactive",
                "interactive": {
                    "type": "list_reply",
                    "list_reply": { "id": id, "title": title }
                }
            }),
        )
        .await;
    }

    async fn session_bag_value(&self, phone: &str, name: &str) -> Option<Value> {
        let contact = self
            .store
            .find_contact_by_phone(self.tenant.id, phone)
            .await
            .unwrap()?;
        let session = self.store.session_for_contact(self.tenant.id, contact.id)?;
        session.variables.get(name).cloned()
    }
}

const PHONE: &str = "911234500001";

#[tokio::test]
async fn trigger_to_greet() {
    let harness = Harness::new();
    harness.add_flow(
        "Hello",
        Some("HI"),
        false,
        300,
        json!({
            "nodes": [
                { "id": "t", "type": "start_trigger", "keywords": ["HI", "HELLO"] },
                { "id": "m", "type": "message", "text": "Hi {{sender_name}}" }
            ],
            "edges": [{ "source": "t", "target": "m" }]
        }),
    );

    harness.inbound_text(PHONE, "HI").await;

    let sent = harness.sender.envelopes();
    assert_eq!(sent.len(), 1);
    match &sent[0].1 {
        MessageEnvelope::Text { body, .. } => assert_eq!(body, "Hi Maria"),
        other => panic!("expected text, got {other:?}"),
    }

    // Session deleted at completion; preview updated.
    let contact = harness
        .store
        .find_contact_by_phone(harness.tenant.id, PHONE)
        .await
        .unwrap()
        .unwrap();
    assert!(harness
        .store
        .session_for_contact(harness.tenant.id, contact.id)
        .is_none());
    let conversation = harness.store.conversation_for_contact(contact.id).unwrap();
    assert_eq!(conversation.last_preview.as_deref(), Some("Hi Maria"));
}

#[tokio::test]
async fn button_branch_selects_edge_by_handle() {
    let harness = Harness::new();
    harness.add_flow(
        "Branch",
        None,
        true,
        300,
        json!({
            "nodes": [
                { "id": "btn", "type": "button", "text": "Continue?", "buttons": [
                    { "id": "yes", "title": "Yes" },
                    { "id": "no", "title": "No" }
                ]},
                { "id": "a", "type": "wait", "variable": "after_yes" },
                { "id": "b", "type": "message", "text": "Bye" }
            ],
            "edges": [
                { "source": "btn", "target": "a", "source_handle": "btn_0" },
                { "source": "btn", "target": "b", "source_handle": "btn_1" }
            ]
        }),
    );

    harness.inbound_text(PHONE, "hello").await;
    assert_eq!(harness.sender.envelopes().len(), 1);

    harness.inbound_button_reply(PHONE, "yes", "Yes").await;

    // Routed to `a` (a wait node), so the session is parked there.
    let contact = harness
        .store
        .find_contact_by_phone(harness.tenant.id, PHONE)
        .await
        .unwrap()
        .unwrap();
    let session = harness
        .store
        .session_for_contact(harness.tenant.id, contact.id)
        .unwrap();
    assert_eq!(session.current_node_id, "a");

    assert_eq!(
        harness.session_bag_value(PHONE, "selected_button").await,
        Some(json!("Yes"))
    );
    assert_eq!(
        harness.session_bag_value(PHONE, "_pending_buttons").await,
        None
    );
    // "Bye" was never sent.
    assert_eq!(harness.sender.envelopes().len(), 1);
}

#[tokio::test]
async fn list_pagination_preserves_ids_across_pages() {
    let harness = Harness::new();
    let items = (1..=14)
        .map(|i| format!("Item {i}"))
        .collect::<Vec<_>>()
        .join("\n");
    harness.add_flow(
        "Menu",
        None,
        true,
        300,
        json!({
            "nodes": [
                { "id": "seed", "type": "list_variable", "name": "options", "value": items },
                { "id": "pick", "type": "list", "text": "Choose one",
                  "source": { "kind": "variable", "name": "options" } },
                { "id": "chosen", "type": "wait", "variable": "noop" }
            ],
            "edges": [
                { "source": "seed", "target": "pick" },
                { "source": "pick", "target": "chosen", "source_handle": "row_10" },
                { "source": "pick", "target": "chosen" }
            ]
        }),
    );

    harness.inbound_text(PHONE, "menu").await;
    harness.inbound_list_reply(PHONE, "__next", "Next").await;
    harness.inbound_list_reply(PHONE, "row_10", "Item 11").await;

    let sent = harness.sender.envelopes();
    let lists: Vec<_> = sent
        .iter()
        .filter(|(_, e)| matches!(e, MessageEnvelope::List { .. }))
        .collect();
    assert_eq!(lists.len(), 2);

    // First page: 9 items plus the synthetic Next row.
    let MessageEnvelope::List { sections, .. } = &lists[0].1 else {
        unreachable!()
    };
    let rows = &sections[0].rows;
    assert_eq!(rows.len(), 10);
    assert_eq!(rows[0].id, "row_0");
    assert_eq!(rows[9].id, "__next");

    // Second page keeps original ids and offers Back.
    let MessageEnvelope::List { sections, .. } = &lists[1].1 else {
        unreachable!()
    };
    let rows = &sections[0].rows;
    assert_eq!(rows[0].id, "__prev");
    assert!(rows.iter().any(|r| r.id == "row_10"));

    assert_eq!(
        harness.session_bag_value(PHONE, "selected_list_id").await,
        Some(json!("row_10"))
    );
    let contact = harness
        .store
        .find_contact_by_phone(harness.tenant.id, PHONE)
        .await
        .unwrap()
        .unwrap();
    let session = harness
        .store
        .session_for_contact(harness.tenant.id, contact.id)
        .unwrap();
    assert_eq!(session.current_node_id, "chosen");
}

#[tokio::test]
async fn stale_session_is_discarded() {
    let harness = Harness::new();
    harness.add_flow(
        "Timed",
        Some("HI"),
        false,
        10,
        json!({
            "nodes": [
                { "id": "t", "type": "start_trigger", "keywords": ["HI"] },
                { "id": "ask", "type": "message", "text": "Your name?" },
                { "id": "w", "type": "wait", "variable": "name" }
            ],
            "edges": [
                { "source": "t", "target": "ask" },
                { "source": "ask", "target": "w" }
            ]
        }),
    );

    harness.inbound_text(PHONE, "HI").await;
    let contact = harness
        .store
        .find_contact_by_phone(harness.tenant.id, PHONE)
        .await
        .unwrap()
        .unwrap();
    let mut session = harness
        .store
        .session_for_contact(harness.tenant.id, contact.id)
        .unwrap();
    assert_eq!(session.current_node_id, "w");

    // Age the session past the 10-second timeout.
    session.last_interaction_at = Utc::now() - Duration::seconds(15);
    SessionStore::save(harness.store.as_ref(), &session)
        .await
        .unwrap();

    // No trigger matches this text, so after the stale session is dropped
    // there is no fallback flow and no response.
    harness.inbound_text(PHONE, "Maria").await;

    assert!(harness
        .store
        .session_for_contact(harness.tenant.id, contact.id)
        .is_none());
    assert_eq!(harness.sender.envelopes().len(), 1);
}

#[tokio::test]
async fn wait_retry_on_invalid_stays_on_node() {
    let harness = Harness::new();
    harness.add_flow(
        "Photo",
        Some("PHOTO"),
        false,
        300,
        json!({
            "nodes": [
                { "id": "t", "type": "start_trigger", "keywords": ["PHOTO"] },
                { "id": "ask", "type": "message", "text": "Send a photo" },
                { "id": "w", "type": "wait", "expected_type": "image",
                  "variable": "photo", "retry_on_invalid": true,
                  "error_message": "Images only please" },
                { "id": "done", "type": "message", "text": "Thanks" }
            ],
            "edges": [
                { "source": "t", "target": "ask" },
                { "source": "ask", "target": "w" },
                { "source": "w", "target": "done" }
            ]
        }),
    );

    harness.inbound_text(PHONE, "PHOTO").await;
    // Invalid input twice: session must stay on the wait node both times.
    harness.inbound_text(PHONE, "not a photo").await;
    harness.inbound_text(PHONE, "still text").await;

    let contact = harness
        .store
        .find_contact_by_phone(harness.tenant.id, PHONE)
        .await
        .unwrap()
        .unwrap();
    let session = harness
        .store
        .session_for_contact(harness.tenant.id, contact.id)
        .unwrap();
    assert_eq!(session.current_node_id, "w");

    let sent = harness.sender.envelopes();
    // Prompt + two error re-prompts, no "Thanks".
    assert_eq!(sent.len(), 3);
    match &sent[2].1 {
        MessageEnvelope::Text { body, .. } => assert_eq!(body, "Images only please"),
        other => panic!("expected text, got {other:?}"),
    }
}

#[tokio::test]
async fn cross_flow_trigger_resets_session() {
    let harness = Harness::new();
    harness.add_flow(
        "First",
        Some("HI"),
        false,
        300,
        json!({
            "nodes": [
                { "id": "t", "type": "start_trigger", "keywords": ["HI"] },
                { "id": "w", "type": "wait", "variable": "x" }
            ],
            "edges": [{ "source": "t", "target": "w" }]
        }),
    );
    let menu_flow = harness.add_flow(
        "Menu",
        Some("MENU"),
        false,
        300,
        json!({
            "nodes": [
                { "id": "t2", "type": "start_trigger", "keywords": ["MENU"] },
                { "id": "m", "type": "message", "text": "Menu here" },
                { "id": "w2", "type": "wait", "variable": "y" }
            ],
            "edges": [
                { "source": "t2", "target": "m" },
                { "source": "m", "target": "w2" }
            ]
        }),
    );

    harness.inbound_text(PHONE, "HI").await;
    harness.inbound_text(PHONE, "MENU").await;

    let contact = harness
        .store
        .find_contact_by_phone(harness.tenant.id, PHONE)
        .await
        .unwrap()
        .unwrap();
    let session = harness
        .store
        .session_for_contact(harness.tenant.id, contact.id)
        .unwrap();
    assert_eq!(session.flow_id, menu_flow);
    assert_eq!(session.current_node_id, "w2");

    let sent = harness.sender.envelopes();
    assert!(matches!(&sent.last().unwrap().1, MessageEnvelope::Text { body, .. } if body == "Menu here"));
}
