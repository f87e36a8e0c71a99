//! WhatsApp Cloud API integration for Zapline
//!
//! This crate owns everything that crosses the wire between Zapline and
//! `graph.facebook.com`: outbound message construction, template component
//! sanitization, media retrieval, and inbound webhook payload parsing with
//! signature verification. It is tenant-agnostic; credentials are passed per
//! call so a single client serves every organization.

pub mod client;
pub mod messages;
pub mod template;
pub mod webhook;

pub use client::{
    validate_media_url, CloudApiClient, MediaInfo, ProviderCredentials, SendOutcome, WhatsAppError,
};
pub use messages::{
    ListRow, ListSection, MediaRef, MessageEnvelope, ProductSection, ReplyButton,
};
pub use template::{
    sanitize_components, TemplateComponent, TemplateLanguage, TemplateMessage, TemplateParameter,
};
pub use webhook::{
    sign_body, verify_signature, InboundMessage, MessageStatusUpdate, StatusKind,
    WebhookChallenge, WebhookMetadata, WebhookPayload, WebhookValue,
};
