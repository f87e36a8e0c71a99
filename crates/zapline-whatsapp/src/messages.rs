//! Outbound message envelopes
//!
//! Every message Zapline can send is one [`MessageEnvelope`] variant. The
//! envelope carries only the content; the recipient and Cloud API framing
//! (`messaging_product`, `recipient_type`) are added when the payload is
//! built, so the same envelope can be reused across recipients.

use crate::template::TemplateMessage;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Reference to a media asset: either an external URL or a previously
/// uploaded provider media id. Exactly one is populated by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaRef {
    Link(String),
    Id(String),
}

impl MediaRef {
    fn to_object(&self) -> Value {
        match self {
            MediaRef::Link(url) => json!({ "link": url }),
            MediaRef::Id(id) => json!({ "id": id }),
        }
    }
}

/// An interactive reply button (at most 3 per message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyButton {
    pub id: String,
    pub title: String,
}

/// A row inside an interactive list section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRow {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An interactive list section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ListRow>,
}

/// A catalog section referencing product retailer ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSection {
    pub title: String,
    pub product_retailer_ids: Vec<String>,
}

/// Tagged union over every outbound message variant the platform produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageEnvelope {
    Text {
        body: String,
        #[serde(default)]
        preview_url: bool,
    },
    Image {
        media: MediaRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Video {
        media: MediaRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Audio {
        media: MediaRef,
    },
    Document {
        media: MediaRef,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
    Template {
        template: TemplateMessage,
    },
    Buttons {
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        header: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        footer: Option<String>,
        buttons: Vec<ReplyButton>,
    },
    List {
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        header: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        footer: Option<String>,
        button_label: String,
        sections: Vec<ListSection>,
    },
    /// Meta Flow (form) call-to-action.
    Flow {
        body: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        header: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        footer: Option<String>,
        flow_id: String,
        flow_cta: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        flow_token: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        screen: Option<String>,
    },
    /// Product-list interactive backed by the tenant's catalog.
    Catalog {
        header: String,
        body: String,
        catalog_id: String,
        sections: Vec<ProductSection>,
    },
}

impl MessageEnvelope {
    /// Short kind tag used for the persisted message record.
    pub fn kind(&self) -> &'static str {
        match self {
            MessageEnvelope::Text { .. } => "text",
            MessageEnvelope::Image { .. } => "image",
            MessageEnvelope::Video { .. } => "video",
            MessageEnvelope::Audio { .. } => "audio",
            MessageEnvelope::Document { .. } => "document",
            MessageEnvelope::Template { .. } => "template",
            MessageEnvelope::Buttons { .. } | MessageEnvelope::List { .. } => "interactive",
            MessageEnvelope::Flow { .. } => "flow",
            MessageEnvelope::Catalog { .. } => "catalog",
        }
    }

    /// Human-readable preview for the conversation list.
    pub fn preview(&self) -> String {
        match self {
            MessageEnvelope::Text { body, .. } => body.clone(),
            MessageEnvelope::Image { caption, .. } => {
                caption.clone().unwrap_or_else(|| "\u{1F4F7} Image".to_string())
            }
            MessageEnvelope::Video { caption, .. } => {
                caption.clone().unwrap_or_else(|| "\u{1F3A5} Video".to_string())
            }
            MessageEnvelope::Audio { .. } => "\u{1F3B5} Audio".to_string(),
            MessageEnvelope::Document { filename, .. } => filename
                .clone()
                .unwrap_or_else(|| "\u{1F4C4} Document".to_string()),
            MessageEnvelope::Template { template } => format!("Template: {}", template.name),
            MessageEnvelope::Buttons { body, .. }
            | MessageEnvelope::List { body, .. }
            | MessageEnvelope::Flow { body, .. }
            | MessageEnvelope::Catalog { body, .. } => body.clone(),
        }
    }

    /// Build the Cloud API `/messages` request body for a recipient.
    pub fn to_payload(&self, to: &str) -> Value {
        let mut payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
        });
        let obj = payload.as_object_mut().expect("payload is an object");

        match self {
            MessageEnvelope::Text { body, preview_url } => {
                obj.insert("type".into(), json!("text"));
                obj.insert(
                    "text".into(),
                    json!({ "body": body, "preview_url": preview_url }),
                );
            }
            MessageEnvelope::Image { media, caption } => {
                let mut media_obj = media.to_object();
                if let Some(caption) = caption {
                    media_obj["caption"] = json!(caption);
                }
                obj.insert("type".into(), json!("image"));
                obj.insert("image".into(), media_obj);
            }
            MessageEnvelope::Video { media, caption } => {
                let mut media_obj = media.to_object();
                if let Some(caption) = caption {
                    media_obj["caption"] = json!(caption);
                }
                obj.insert("type".into(), json!("video"));
                obj.insert("video".into(), media_obj);
            }
            MessageEnvelope::Audio { media } => {
                obj.insert("type".into(), json!("audio"));
                obj.insert("audio".into(), media.to_object());
            }
            MessageEnvelope::Document {
                media,
                caption,
                filename,
            } => {
                let mut media_obj = media.to_object();
                if let Some(caption) = caption {
                    media_obj["caption"] = json!(caption);
                }
                if let Some(filename) = filename {
                    media_obj["filename"] = json!(filename);
                }
                obj.insert("type".into(), json!("document"));
                obj.insert("document".into(), media_obj);
            }
            MessageEnvelope::Template { template } => {
                obj.insert("type".into(), json!("template"));
                obj.insert("template".into(), template.to_object());
            }
            MessageEnvelope::Buttons {
                body,
                header,
                footer,
                buttons,
            } => {
                let actions: Vec<Value> = buttons
                    .iter()
                    .map(|b| {
                        json!({
                            "type": "reply",
                            "reply": { "id": b.id, "title": b.title }
                        })
                    })
                    .collect();
                let mut interactive = json!({
                    "type": "button",
                    "body": { "text": body },
                    "action": { "buttons": actions },
                });
                if let Some(header) = header {
                    interactive["header"] = json!({ "type": "text", "text": header });
                }
                if let Some(footer) = footer {
                    interactive["footer"] = json!({ "text": footer });
                }
                obj.insert("type".into(), json!("interactive"));
                obj.insert("interactive".into(), interactive);
            }
            MessageEnvelope::List {
                body,
                header,
                footer,
                button_label,
                sections,
            } => {
                let mut interactive = json!({
                    "type": "list",
                    "body": { "text": body },
                    "action": {
                        "button": button_label,
                        "sections": sections,
                    },
                });
                if let Some(header) = header {
                    interactive["header"] = json!({ "type": "text", "text": header });
                }
                if let Some(footer) = footer {
                    interactive["footer"] = json!({ "text": footer });
                }
                obj.insert("type".into(), json!("interactive"));
                obj.insert("interactive".into(), interactive);
            }
            MessageEnvelope::Flow {
                body,
                header,
                footer,
                flow_id,
                flow_cta,
                flow_token,
                screen,
            } => {
                let mut params = json!({
                    "flow_message_version": "3",
                    "flow_id": flow_id,
                    "flow_cta": flow_cta,
                    "flow_action": "navigate",
                });
                if let Some(token) = flow_token {
                    params["flow_token"] = json!(token);
                }
                if let Some(screen) = screen {
                    params["flow_action_payload"] = json!({ "screen": screen });
                }
                let mut interactive = json!({
                    "type": "flow",
                    "body": { "text": body },
                    "action": {
                        "name": "flow",
                        "parameters": params,
                    },
                });
                if let Some(header) = header {
                    interactive["header"] = json!({ "type": "text", "text": header });
                }
                if let Some(footer) = footer {
                    interactive["footer"] = json!({ "text": footer });
                }
                obj.insert("type".into(), json!("interactive"));
                obj.insert("interactive".into(), interactive);
            }
            MessageEnvelope::Catalog {
                header,
                body,
                catalog_id,
                sections,
            } => {
                let section_objs: Vec<Value> = sections
                    .iter()
                    .map(|s| {
                        json!({
                            "title": s.title,
                            "product_items": s
                                .product_retailer_ids
                                .iter()
                                .map(|id| json!({ "product_retailer_id": id }))
                                .collect::<Vec<_>>(),
                        })
                    })
                    .collect();
                let interactive = json!({
                    "type": "product_list",
                    "header": { "type": "text", "text": header },
                    "body": { "text": body },
                    "action": {
                        "catalog_id": catalog_id,
                        "sections": section_objs,
                    },
                });
                obj.insert("type".into(), json!("interactive"));
                obj.insert("interactive".into(), interactive);
            }
        }

        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_shape() {
        let envelope = MessageEnvelope::Text {
            body: "hello".to_string(),
            preview_url: false,
        };
        let payload = envelope.to_payload("5511999990000");

        assert_eq!(payload["messaging_product"], "whatsapp");
        assert_eq!(payload["to"], "5511999990000");
        assert_eq!(payload["type"], "text");
        assert_eq!(payload["text"]["body"], "hello");
    }

    #[test]
    fn media_ref_is_exclusive() {
        let by_url = MessageEnvelope::Image {
            media: MediaRef::Link("https://example.com/a.jpg".to_string()),
            caption: None,
        };
        let payload = by_url.to_payload("1");
        assert_eq!(payload["image"]["link"], "https://example.com/a.jpg");
        assert!(payload["image"].get("id").is_none());

        let by_id = MessageEnvelope::Image {
            media: MediaRef::Id("123".to_string()),
            caption: Some("cap".to_string()),
        };
        let payload = by_id.to_payload("1");
        assert_eq!(payload["image"]["id"], "123");
        assert_eq!(payload["image"]["caption"], "cap");
        assert!(payload["image"].get("link").is_none());
    }

    #[test]
    fn buttons_payload_shape() {
        let envelope = MessageEnvelope::Buttons {
            body: "Pick one".to_string(),
            header: None,
            footer: None,
            buttons: vec![
                ReplyButton {
                    id: "yes".to_string(),
                    title: "Yes".to_string(),
                },
                ReplyButton {
                    id: "no".to_string(),
                    title: "No".to_string(),
                },
            ],
        };
        let payload = envelope.to_payload("1");

        assert_eq!(payload["type"], "interactive");
        assert_eq!(payload["interactive"]["type"], "button");
        let buttons = payload["interactive"]["action"]["buttons"]
            .as_array()
            .unwrap();
        assert_eq!(buttons.len(), 2);
        assert_eq!(buttons[0]["reply"]["id"], "yes");
    }

    #[test]
    fn list_payload_keeps_row_ids() {
        let envelope = MessageEnvelope::List {
            body: "Menu".to_string(),
            header: Some("Today".to_string()),
            footer: None,
            button_label: "Open".to_string(),
            sections: vec![ListSection {
                title: "Mains".to_string(),
                rows: vec![ListRow {
                    id: "row_0".to_string(),
                    title: "Pasta".to_string(),
                    description: None,
                }],
            }],
        };
        let payload = envelope.to_payload("1");

        assert_eq!(payload["interactive"]["type"], "list");
        assert_eq!(
            payload["interactive"]["action"]["sections"][0]["rows"][0]["id"],
            "row_0"
        );
        assert_eq!(payload["interactive"]["header"]["text"], "Today");
    }

    #[test]
    fn envelope_previews() {
        let doc = MessageEnvelope::Document {
            media: MediaRef::Id("m1".to_string()),
            caption: None,
            filename: Some("invoice.pdf".to_string()),
        };
        assert_eq!(doc.preview(), "invoice.pdf");
        assert_eq!(doc.kind(), "document");

        let text = MessageEnvelope::Text {
            body: "hi".to_string(),
            preview_url: false,
        };
        assert_eq!(text.preview(), "hi");
    }
}
