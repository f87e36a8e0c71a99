//! Inbound webhook payloads and signature handling
//!
//! The Cloud API delivers both customer messages and delivery statuses
//! through the same envelope shape. Parsing is lenient: unknown message
//! types still produce a usable [`InboundMessage`] with `message_type`
//! preserved, so the inbox can record them as `unknown` instead of dropping
//! the event.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Webhook verification handshake (GET query parameters).
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChallenge {
    #[serde(rename = "hub.mode")]
    pub mode: String,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: String,
    #[serde(rename = "hub.challenge")]
    pub challenge: String,
}

impl WebhookChallenge {
    /// Echo the challenge when the token matches, otherwise refuse.
    pub fn verify(&self, expected_token: &str) -> Result<&str, SignatureError> {
        if self.mode != "subscribe" {
            return Err(SignatureError::InvalidMode);
        }
        if self.verify_token != expected_token {
            return Err(SignatureError::InvalidToken);
        }
        Ok(&self.challenge)
    }
}

/// Complete webhook payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub object: String,
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEntry {
    pub id: String,
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChange {
    pub field: String,
    pub value: WebhookValue,
}

/// The interesting part of a change: messages and/or statuses plus the
/// metadata naming which tenant line they arrived on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookValue {
    pub messaging_product: String,
    pub metadata: WebhookMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<WaContact>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<InboundMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<MessageStatusUpdate>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookMetadata {
    pub display_phone_number: String,
    pub phone_number_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaContact {
    pub wa_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<WaProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaProfile {
    pub name: Option<String>,
}

/// Media attachment on an inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPayload {
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationPayload {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ButtonPayload {
    pub payload: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionPayload {
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPayload {
    pub catalog_id: String,
    #[serde(default)]
    pub product_items: Vec<OrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_retailer_id: String,
    pub quantity: i64,
    pub item_price: f64,
    pub currency: String,
}

/// Interactive reply: button tap, list selection, or Meta Flow submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractivePayload {
    #[serde(rename = "type")]
    pub interactive_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_reply: Option<InteractiveReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_reply: Option<InteractiveReply>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nfm_reply: Option<NfmReply>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractiveReply {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Meta Flow form submission. `response_json` is the submitted field map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NfmReply {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub response_json: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageContext {
    pub from: Option<String>,
    pub id: Option<String>,
}

/// One inbound customer message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub from: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<MediaPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<MediaPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<MediaPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sticker: Option<MediaPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contacts: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button: Option<ButtonPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive: Option<InteractivePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reaction: Option<ReactionPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderPayload>,
}

impl InboundMessage {
    /// Best-effort text content: body text, button text, or interactive
    /// reply title.
    pub fn text_body(&self) -> Option<String> {
        if let Some(text) = &self.text {
            return Some(text.body.clone());
        }
        if let Some(button) = &self.button {
            return Some(button.text.clone());
        }
        if let Some(reply) = self.interactive_reply() {
            return Some(reply.title.clone());
        }
        None
    }

    /// The button or list reply, whichever is present.
    pub fn interactive_reply(&self) -> Option<&InteractiveReply> {
        self.interactive
            .as_ref()
            .and_then(|i| i.button_reply.as_ref().or(i.list_reply.as_ref()))
    }

    /// The Meta Flow submission, if this message is one.
    pub fn nfm_reply(&self) -> Option<&NfmReply> {
        self.interactive.as_ref().and_then(|i| i.nfm_reply.as_ref())
    }

    /// The media attachment matching the message type.
    pub fn media(&self) -> Option<&MediaPayload> {
        match self.message_type.as_str() {
            "image" => self.image.as_ref(),
            "video" => self.video.as_ref(),
            "audio" => self.audio.as_ref(),
            "document" => self.document.as_ref(),
            "sticker" => self.sticker.as_ref(),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        self.message_type == "text"
    }
}

/// Provider-reported delivery status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl StatusKind {
    /// Position in the monotone chain; `Failed` is terminal and outside it.
    pub fn rank(&self) -> u8 {
        match self {
            StatusKind::Sent => 1,
            StatusKind::Delivered => 2,
            StatusKind::Read => 3,
            StatusKind::Failed => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusKind::Sent => "sent",
            StatusKind::Delivered => "delivered",
            StatusKind::Read => "read",
            StatusKind::Failed => "failed",
        }
    }
}

/// A delivery/read/failure status update for a previously sent message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStatusUpdate {
    pub id: String,
    pub status: StatusKind,
    pub timestamp: String,
    pub recipient_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<StatusError>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusError {
    pub code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_data: Option<HashMap<String, serde_json::Value>>,
}

impl MessageStatusUpdate {
    /// Provider error text, when the status carries one.
    pub fn error_text(&self) -> Option<String> {
        self.errors.as_ref().and_then(|errors| {
            errors.first().map(|e| {
                e.message
                    .clone()
                    .or_else(|| e.title.clone())
                    .unwrap_or_else(|| format!("provider error {}", e.code))
            })
        })
    }
}

impl WebhookPayload {
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body)
    }

    /// All inbound messages across entries, paired with their metadata and
    /// the sender profile when the provider included one.
    pub fn messages(&self) -> Vec<(&WebhookMetadata, Option<&WaContact>, &InboundMessage)> {
        let mut out = Vec::new();
        for entry in &self.entry {
            for change in &entry.changes {
                if let Some(messages) = &change.value.messages {
                    for message in messages {
                        let contact = change.value.contacts.as_ref().and_then(|contacts| {
                            contacts.iter().find(|c| c.wa_id == message.from)
                        });
                        out.push((&change.value.metadata, contact, message));
                    }
                }
            }
        }
        out
    }

    /// All status updates across entries, paired with their metadata.
    pub fn statuses(&self) -> Vec<(&WebhookMetadata, &MessageStatusUpdate)> {
        let mut out = Vec::new();
        for entry in &self.entry {
            for change in &entry.changes {
                if let Some(statuses) = &change.value.statuses {
                    for status in statuses {
                        out.push((&change.value.metadata, status));
                    }
                }
            }
        }
        out
    }

    /// The first phone-number id in the payload, used for tenant resolution
    /// when the callback URL does not name one.
    pub fn phone_number_id(&self) -> Option<&str> {
        self.entry
            .first()
            .and_then(|e| e.changes.first())
            .map(|c| c.value.metadata.phone_number_id.as_str())
    }
}

/// Compute `sha256=<hex hmac>` over a body, as used both for verifying
/// provider deliveries and for signing forwards to tenant webhooks.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verify an `X-Hub-Signature-256` header against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], header: &str) -> Result<(), SignatureError> {
    let hex_part = header
        .strip_prefix("sha256=")
        .ok_or(SignatureError::InvalidFormat)?;
    let expected = hex::decode(hex_part).map_err(|_| SignatureError::InvalidFormat)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::InvalidFormat)?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// Signature and handshake failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SignatureError {
    #[error("invalid webhook mode")]
    InvalidMode,
    #[error("invalid verify token")]
    InvalidToken,
    #[error("malformed signature header")]
    InvalidFormat,
    #[error("signature mismatch")]
    Mismatch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_roundtrip() {
        let challenge = WebhookChallenge {
            mode: "subscribe".to_string(),
            verify_token: "secret".to_string(),
            challenge: "12345".to_string(),
        };
        assert_eq!(challenge.verify("secret"), Ok("12345"));
        assert_eq!(
            challenge.verify("other"),
            Err(SignatureError::InvalidToken)
        );
    }

    #[test]
    fn signature_roundtrip_and_tamper() {
        let body = br#"{"object":"whatsapp_business_account"}"#;
        let header = sign_body("token-1", body);
        assert!(verify_signature("token-1", body, &header).is_ok());

        // One flipped byte must be rejected.
        let mut tampered = body.to_vec();
        tampered[0] ^= 1;
        assert_eq!(
            verify_signature("token-1", &tampered, &header),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_signature("other", body, &header),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn status_rank_is_monotone() {
        assert!(StatusKind::Sent.rank() < StatusKind::Delivered.rank());
        assert!(StatusKind::Delivered.rank() < StatusKind::Read.rank());
    }
}
