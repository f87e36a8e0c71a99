//! Typed node configurations
//!
//! Every node a flow author can place maps to one [`NodeConfig`] variant.
//! The tag is the node's `type` field in the stored definition, so the
//! interpreter's dispatch is an exhaustive match instead of a string switch.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A reply button offered by a `button` node (at most 3 are sent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonOption {
    pub id: String,
    pub title: String,
}

/// An inline list row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRowConfig {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An inline list section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSectionConfig {
    pub title: String,
    pub rows: Vec<ListRowConfig>,
}

/// Where a `list` node gets its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ListSource {
    /// Sections authored inline in the flow builder.
    Inline { sections: Vec<ListSectionConfig> },
    /// Rows built from an array variable; elements may be strings or
    /// objects with `id`/`title`/`description`.
    Variable { name: String },
    /// Rows fetched from a Google Apps Script endpoint.
    GoogleSheet {
        script_url: String,
        #[serde(default)]
        title_column: Option<String>,
        #[serde(default)]
        description_column: Option<String>,
    },
}

/// Input kinds a `wait` node can demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpectedInput {
    #[default]
    Any,
    Text,
    Image,
    Video,
    Audio,
    Document,
    /// Any downloadable attachment.
    File,
}

impl ExpectedInput {
    /// Whether an inbound provider message type satisfies this expectation.
    pub fn accepts(&self, message_type: &str) -> bool {
        match self {
            ExpectedInput::Any => true,
            ExpectedInput::Text => message_type == "text" || message_type == "interactive",
            ExpectedInput::Image => message_type == "image",
            ExpectedInput::Video => message_type == "video",
            ExpectedInput::Audio => message_type == "audio",
            ExpectedInput::Document => message_type == "document",
            ExpectedInput::File => {
                matches!(message_type, "image" | "video" | "audio" | "document" | "sticker")
            }
        }
    }
}

/// Comparison operators for `condition` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Equals,
    Contains,
    NotEquals,
    Exists,
}

/// One `router` case: route to handle `id` when the variable compares true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterCase {
    pub id: String,
    pub op: CompareOp,
    pub value: String,
}

/// Numeric-aware comparison used by `router` and api routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
}

impl CompareOp {
    /// Compare numerically when both sides parse as numbers, else as
    /// strings (only `==` can match then).
    pub fn evaluate(&self, left: &str, right: &str) -> bool {
        match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
            (Ok(l), Ok(r)) => match self {
                CompareOp::Eq => (l - r).abs() < f64::EPSILON,
                CompareOp::Lt => l < r,
                CompareOp::Gt => l > r,
            },
            _ => match self {
                CompareOp::Eq => left.trim() == right.trim(),
                _ => false,
            },
        }
    }
}

/// One `keyword_match` case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordCase {
    pub id: String,
    pub keyword: String,
}

/// Regex validators supported by the `validator` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Email,
    Phone,
    Pan,
    Aadhar,
    Gst,
    Pincode,
    /// Inbound message must be an image.
    Image,
    /// Inbound message must be a PDF document.
    Pdf,
}

/// Per-weekday open window for `business_hours` nodes and flow-level
/// working-hours policies. `day` is 0 = Monday .. 6 = Sunday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayWindow {
    pub day: u8,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// "HH:MM", 24-hour.
    pub open: String,
    pub close: String,
}

fn default_enabled() -> bool {
    true
}

/// Map one JSON response field into a session variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMapping {
    pub path: String,
    pub variable: String,
}

/// Custom route evaluated after an `api` node's response mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRoute {
    pub id: String,
    pub variable: String,
    pub op: CompareOp,
    pub value: String,
}

/// Payment providers supported by the `payment` node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Razorpay,
    Stripe,
}

/// What a `media_forward` node does with the downloaded bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MediaForwardTarget {
    /// Save under the public media directory and expose the URL.
    Save { url_variable: String },
    /// POST as multipart to an external endpoint and map the response.
    Post {
        endpoint: String,
        #[serde(default = "default_field_name")]
        field_name: String,
        #[serde(default)]
        mappings: Vec<ResponseMapping>,
    },
}

fn default_field_name() -> String {
    "file".to_string()
}

/// How `drive_image_lookup` talks to Google Drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum DriveLookupVia {
    /// Native Drive v3 API with an API key.
    ApiKey { api_key: String },
    /// A user-deployed Apps Script endpoint.
    Script { script_url: String },
}

/// Every node type the interpreter understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeConfig {
    /// Entry node matching inbound keywords.
    StartTrigger {
        #[serde(default)]
        keywords: Vec<String>,
        #[serde(default)]
        accept_any: bool,
        #[serde(default)]
        partial_match: bool,
        #[serde(default)]
        case_sensitive: bool,
    },

    /// Plain text send. (`text` is the legacy tag for the same node.)
    #[serde(alias = "text")]
    Message { text: String },

    Image {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        media_id: Option<String>,
        #[serde(default)]
        caption: Option<String>,
    },

    Video {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        media_id: Option<String>,
        #[serde(default)]
        caption: Option<String>,
    },

    Document {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        media_id: Option<String>,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        filename: Option<String>,
    },

    Button {
        text: String,
        #[serde(default)]
        header: Option<String>,
        #[serde(default)]
        footer: Option<String>,
        buttons: Vec<ButtonOption>,
        #[serde(default)]
        retry_on_invalid: bool,
        #[serde(default)]
        retry_message: Option<String>,
    },

    List {
        text: String,
        #[serde(default)]
        header: Option<String>,
        #[serde(default = "default_list_button")]
        button_label: String,
        source: ListSource,
    },

    /// Meta Flow (form) call-to-action.
    Flow {
        text: String,
        flow_id: String,
        #[serde(default = "default_flow_cta")]
        cta: String,
        #[serde(default)]
        screen: Option<String>,
    },

    Wait {
        #[serde(default)]
        expected_type: ExpectedInput,
        #[serde(default)]
        variable: Option<String>,
        #[serde(default)]
        retry_on_invalid: bool,
        #[serde(default)]
        error_message: Option<String>,
    },

    Delay {
        seconds: u64,
    },

    Variable {
        name: String,
        value: String,
    },

    /// Split a newline-delimited template into an array variable.
    ListVariable {
        name: String,
        value: String,
    },

    UpdateContact {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        email: Option<String>,
        #[serde(default)]
        labels: Option<Vec<String>>,
    },

    /// Render a template over each element of an array variable.
    Map {
        source: String,
        template: String,
        #[serde(default = "default_separator")]
        separator: String,
        target: String,
    },

    Condition {
        left: String,
        op: ConditionOp,
        #[serde(default)]
        right: String,
    },

    Router {
        variable: String,
        cases: Vec<RouterCase>,
    },

    KeywordMatch {
        variable: String,
        keywords: Vec<KeywordCase>,
        #[serde(default)]
        case_sensitive: bool,
    },

    Validator {
        kind: ValidatorKind,
        #[serde(default = "default_validator_value")]
        value: String,
    },

    /// Classify a mobile number by country calling code.
    PhoneParser {
        #[serde(default = "default_phone_value")]
        value: String,
    },

    BusinessHours {
        timezone: String,
        schedule: Vec<DayWindow>,
    },

    Api {
        url: String,
        #[serde(default = "default_method")]
        method: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        body: Option<String>,
        #[serde(default)]
        mappings: Vec<ResponseMapping>,
        #[serde(default)]
        routes: Vec<ApiRoute>,
    },

    Sql {
        query: String,
        #[serde(default)]
        params: Vec<String>,
        #[serde(default)]
        mappings: Vec<ResponseMapping>,
    },

    GoogleSheet {
        script_url: String,
        #[serde(default)]
        payload: HashMap<String, String>,
    },

    GoogleSheetQuery {
        script_url: String,
        #[serde(default)]
        match_conditions: HashMap<String, String>,
        #[serde(default)]
        columns: Vec<ResponseMapping>,
    },

    DriveImageLookup {
        #[serde(flatten)]
        via: DriveLookupVia,
        #[serde(default)]
        folder_id: Option<String>,
        #[serde(default)]
        file_name: Option<String>,
        target: String,
        #[serde(default)]
        auto_send: bool,
        #[serde(default)]
        send_delay_secs: u64,
    },

    /// Download the last inbound media and re-home it.
    MediaForward {
        #[serde(flatten)]
        target: MediaForwardTarget,
    },

    Payment {
        provider: PaymentProvider,
        /// Amount template, in the currency's smallest unit.
        amount: String,
        #[serde(default = "default_currency")]
        currency: String,
        #[serde(default)]
        description: Option<String>,
        key_id: String,
        key_secret: String,
        /// Message sent with the link; `{{payment_url}}` is available.
        message: String,
    },

    Shopify {
        store_domain: String,
        api_token: String,
        order_number: String,
        #[serde(default)]
        mappings: Vec<ResponseMapping>,
    },

    Woocommerce {
        site_url: String,
        consumer_key: String,
        consumer_secret: String,
        order_number: String,
        #[serde(default)]
        mappings: Vec<ResponseMapping>,
    },

    /// Send a text to an arbitrary phone number. The ingester's self-send
    /// filter is the safety net when this targets the tenant's own line.
    SendExternal {
        phone: String,
        text: String,
    },

    /// WhatsApp product-list interactive.
    Catalogue {
        header: String,
        body: String,
        catalog_id: String,
        sections: Vec<CatalogSectionConfig>,
    },

    /// Send every URL in an array variable as an image.
    GroupImages {
        source: String,
        #[serde(default)]
        delay_secs: u64,
        #[serde(default)]
        caption: Option<String>,
    },

    /// Iterate an array; branches `loop` while elements remain, `done` after.
    Loop {
        source: String,
        #[serde(default = "default_item_variable")]
        item_variable: String,
    },

    /// Hand the conversation to a human agent and end the session.
    Agent {
        #[serde(default)]
        message: Option<String>,
    },

    /// Override the session timeout from inside the flow.
    SessionConfig {
        timeout_secs: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSectionConfig {
    pub title: String,
    pub product_ids: Vec<String>,
}

fn default_list_button() -> String {
    "Choose".to_string()
}

fn default_flow_cta() -> String {
    "Open".to_string()
}

fn default_separator() -> String {
    "\n".to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_validator_value() -> String {
    "{{last_input}}".to_string()
}

fn default_phone_value() -> String {
    "{{sender_mobile}}".to_string()
}

fn default_item_variable() -> String {
    "item".to_string()
}

impl NodeConfig {
    /// Whether the node suspends the session awaiting user input.
    pub fn awaits_input(&self) -> bool {
        matches!(
            self,
            NodeConfig::Button { .. }
                | NodeConfig::List { .. }
                | NodeConfig::Flow { .. }
                | NodeConfig::Wait { .. }
        )
    }

    /// The waiting-kind marker persisted with a suspended session.
    pub fn waiting_kind(&self) -> Option<&'static str> {
        match self {
            NodeConfig::Button { .. } => Some("button"),
            NodeConfig::List { .. } => Some("list"),
            NodeConfig::Flow { .. } => Some("flow"),
            NodeConfig::Wait { .. } => Some("wait"),
            _ => None,
        }
    }

    /// The node's `type` tag as stored.
    pub fn type_tag(&self) -> &'static str {
        match self {
            NodeConfig::StartTrigger { .. } => "start_trigger",
            NodeConfig::Message { .. } => "message",
            NodeConfig::Image { .. } => "image",
            NodeConfig::Video { .. } => "video",
            NodeConfig::Document { .. } => "document",
            NodeConfig::Button { .. } => "button",
            NodeConfig::List { .. } => "list",
            NodeConfig::Flow { .. } => "flow",
            NodeConfig::Wait { .. } => "wait",
            NodeConfig::Delay { .. } => "delay",
            NodeConfig::Variable { .. } => "variable",
            NodeConfig::ListVariable { .. } => "list_variable",
            NodeConfig::UpdateContact { .. } => "update_contact",
            NodeConfig::Map { .. } => "map",
            NodeConfig::Condition { .. } => "condition",
            NodeConfig::Router { .. } => "router",
            NodeConfig::KeywordMatch { .. } => "keyword_match",
            NodeConfig::Validator { .. } => "validator",
            NodeConfig::PhoneParser { .. } => "phone_parser",
            NodeConfig::BusinessHours { .. } => "business_hours",
            NodeConfig::Api { .. } => "api",
            NodeConfig::Sql { .. } => "sql",
            NodeConfig::GoogleSheet { .. } => "google_sheet",
            NodeConfig::GoogleSheetQuery { .. } => "google_sheet_query",
            NodeConfig::DriveImageLookup { .. } => "drive_image_lookup",
            NodeConfig::MediaForward { .. } => "media_forward",
            NodeConfig::Payment { .. } => "payment",
            NodeConfig::Shopify { .. } => "shopify",
            NodeConfig::Woocommerce { .. } => "woocommerce",
            NodeConfig::SendExternal { .. } => "send_external",
            NodeConfig::Catalogue { .. } => "catalogue",
            NodeConfig::GroupImages { .. } => "group_images",
            NodeConfig::Loop { .. } => "loop",
            NodeConfig::Agent { .. } => "agent",
            NodeConfig::SessionConfig { .. } => "session_config",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_accepts_legacy_text_tag() {
        let node: NodeConfig =
            serde_json::from_value(serde_json::json!({ "type": "text", "text": "hi" })).unwrap();
        assert_eq!(
            node,
            NodeConfig::Message {
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn start_trigger_defaults() {
        let node: NodeConfig = serde_json::from_value(serde_json::json!({
            "type": "start_trigger",
            "keywords": ["HI", "HELLO"]
        }))
        .unwrap();
        match node {
            NodeConfig::StartTrigger {
                keywords,
                accept_any,
                partial_match,
                case_sensitive,
            } => {
                assert_eq!(keywords, vec!["HI", "HELLO"]);
                assert!(!accept_any && !partial_match && !case_sensitive);
            }
            other => panic!("unexpected node: {other:?}"),
        }
    }

    #[test]
    fn compare_op_is_numeric_aware() {
        assert!(CompareOp::Eq.evaluate("10", "10.0"));
        assert!(CompareOp::Lt.evaluate("9", "10"));
        assert!(CompareOp::Gt.evaluate("11", "10"));
        assert!(CompareOp::Eq.evaluate("yes", "yes"));
        assert!(!CompareOp::Lt.evaluate("abc", "10"));
    }

    #[test]
    fn expected_input_file_accepts_attachments() {
        assert!(ExpectedInput::File.accepts("document"));
        assert!(ExpectedInput::File.accepts("image"));
        assert!(!ExpectedInput::File.accepts("text"));
        assert!(ExpectedInput::Any.accepts("text"));
        assert!(ExpectedInput::Text.accepts("interactive"));
    }

    #[test]
    fn wait_node_serde_shape() {
        let node: NodeConfig = serde_json::from_value(serde_json::json!({
            "type": "wait",
            "expected_type": "image",
            "variable": "photo",
            "retry_on_invalid": true,
            "error_message": "Please send a photo"
        }))
        .unwrap();
        assert!(node.awaits_input());
        assert_eq!(node.waiting_kind(), Some("wait"));
        assert_eq!(node.type_tag(), "wait");
    }

    #[test]
    fn list_source_variants() {
        let inline: ListSource = serde_json::from_value(serde_json::json!({
            "kind": "inline",
            "sections": [{ "title": "A", "rows": [{ "id": "r", "title": "Row" }] }]
        }))
        .unwrap();
        assert!(matches!(inline, ListSource::Inline { .. }));

        let variable: ListSource =
            serde_json::from_value(serde_json::json!({ "kind": "variable", "name": "rows" }))
                .unwrap();
        assert!(matches!(variable, ListSource::Variable { .. }));
    }
}
