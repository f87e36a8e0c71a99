//! Webhook payload parsing against realistic Cloud API envelopes.

use zapline_whatsapp::webhook::{verify_signature, sign_body, StatusKind, WebhookPayload};

fn text_envelope() -> String {
    serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1031234567890",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550001111",
                        "phone_number_id": "106540352242922"
                    },
                    "contacts": [{
                        "profile": { "name": "Maria" },
                        "wa_id": "911234500001"
                    }],
                    "messages": [{
                        "from": "911234500001",
                        "id": "wamid.HBgLOTEx",
                        "timestamp": "1714000000",
                        "type": "text",
                        "text": { "body": "HI" }
                    }]
                }
            }]
        }]
    })
    .to_string()
}

#[test]
fn parses_text_message_with_profile() {
    let payload = WebhookPayload::parse(&text_envelope()).unwrap();

    assert_eq!(payload.phone_number_id(), Some("106540352242922"));
    let messages = payload.messages();
    assert_eq!(messages.len(), 1);

    let (metadata, contact, message) = &messages[0];
    assert_eq!(metadata.display_phone_number, "15550001111");
    assert_eq!(message.from, "911234500001");
    assert_eq!(message.text_body().as_deref(), Some("HI"));
    let profile = contact.and_then(|c| c.profile.as_ref());
    assert_eq!(
        profile.and_then(|p| p.name.as_deref()),
        Some("Maria")
    );
}

#[test]
fn parses_interactive_button_reply() {
    let body = serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550001111",
                        "phone_number_id": "106540352242922"
                    },
                    "messages": [{
                        "from": "911234500001",
                        "id": "wamid.reply",
                        "timestamp": "1714000001",
                        "type": "interactive",
                        "interactive": {
                            "type": "button_reply",
                            "button_reply": { "id": "yes", "title": "Yes" }
                        }
                    }]
                }
            }]
        }]
    })
    .to_string();

    let payload = WebhookPayload::parse(&body).unwrap();
    let messages = payload.messages();
    let (_, _, message) = &messages[0];

    let reply = message.interactive_reply().unwrap();
    assert_eq!(reply.id, "yes");
    assert_eq!(reply.title, "Yes");
    assert_eq!(message.text_body().as_deref(), Some("Yes"));
}

#[test]
fn parses_nfm_reply() {
    let body = serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550001111",
                        "phone_number_id": "106540352242922"
                    },
                    "messages": [{
                        "from": "911234500001",
                        "id": "wamid.form",
                        "timestamp": "1714000002",
                        "type": "interactive",
                        "interactive": {
                            "type": "nfm_reply",
                            "nfm_reply": {
                                "name": "flow",
                                "response_json": "{\"email\":\"a@b.c\"}",
                                "body": "Sent"
                            }
                        }
                    }]
                }
            }]
        }]
    })
    .to_string();

    let payload = WebhookPayload::parse(&body).unwrap();
    let messages = payload.messages();
    let (_, _, message) = &messages[0];

    let nfm = message.nfm_reply().unwrap();
    let fields: serde_json::Value = serde_json::from_str(&nfm.response_json).unwrap();
    assert_eq!(fields["email"], "a@b.c");
}

#[test]
fn parses_status_update_with_error() {
    let body = serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550001111",
                        "phone_number_id": "106540352242922"
                    },
                    "statuses": [{
                        "id": "wamid.out1",
                        "status": "failed",
                        "timestamp": "1714000005",
                        "recipient_id": "911234500001",
                        "errors": [{
                            "code": 131047,
                            "title": "Re-engagement message",
                            "message": "Message failed to send"
                        }]
                    }]
                }
            }]
        }]
    })
    .to_string();

    let payload = WebhookPayload::parse(&body).unwrap();
    let statuses = payload.statuses();
    assert_eq!(statuses.len(), 1);

    let (_, status) = &statuses[0];
    assert_eq!(status.status, StatusKind::Failed);
    assert_eq!(
        status.error_text().as_deref(),
        Some("Message failed to send")
    );
}

#[test]
fn unknown_message_type_still_parses() {
    let body = serde_json::json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550001111",
                        "phone_number_id": "106540352242922"
                    },
                    "messages": [{
                        "from": "911234500001",
                        "id": "wamid.unknown",
                        "timestamp": "1714000010",
                        "type": "ephemeral"
                    }]
                }
            }]
        }]
    })
    .to_string();

    let payload = WebhookPayload::parse(&body).unwrap();
    let messages = payload.messages();
    let (_, _, message) = &messages[0];
    assert_eq!(message.message_type, "ephemeral");
    assert!(message.text_body().is_none());
}

#[test]
fn forward_signature_matches_verification() {
    let body = text_envelope();
    let signature = sign_body("external-secret", body.as_bytes());
    assert!(verify_signature("external-secret", body.as_bytes(), &signature).is_ok());
}
