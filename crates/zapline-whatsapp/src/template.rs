//! Template messages and component sanitization
//!
//! The Cloud API rejects template payloads with malformed components, so the
//! sanitizer here is the single gate every template send goes through:
//! components without parameters are dropped, header components must carry a
//! typed media or text sub-parameter, body parameters must be typed text, and
//! button components must carry a sub-type and index.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Template language selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateLanguage {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
}

impl TemplateLanguage {
    pub fn new<S: Into<String>>(code: S) -> Self {
        Self {
            code: code.into(),
            policy: None,
        }
    }
}

/// One parameter inside a template component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateParameter {
    #[serde(rename = "type")]
    pub param_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Value>,
}

impl TemplateParameter {
    /// A plain text body parameter.
    pub fn text<S: Into<String>>(value: S) -> Self {
        Self {
            param_type: "text".to_string(),
            text: Some(value.into()),
            image: None,
            video: None,
            document: None,
        }
    }

    /// A media header parameter referencing an uploaded media id.
    pub fn media_id<S: Into<String>>(media_type: &str, id: S) -> Self {
        let obj = json!({ "id": id.into() });
        let mut param = Self {
            param_type: media_type.to_string(),
            text: None,
            image: None,
            video: None,
            document: None,
        };
        match media_type {
            "image" => param.image = Some(obj),
            "video" => param.video = Some(obj),
            "document" => param.document = Some(obj),
            _ => {}
        }
        param
    }

    fn is_valid_media(&self) -> bool {
        match self.param_type.as_str() {
            "image" => self.image.is_some(),
            "video" => self.video.is_some(),
            "document" => self.document.is_some(),
            "text" => self.text.is_some(),
            _ => false,
        }
    }
}

/// One component of a template message (header, body, or button).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateComponent {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
}

impl TemplateComponent {
    pub fn header(parameters: Vec<TemplateParameter>) -> Self {
        Self {
            component_type: "header".to_string(),
            sub_type: None,
            index: None,
            parameters,
        }
    }

    pub fn body(parameters: Vec<TemplateParameter>) -> Self {
        Self {
            component_type: "body".to_string(),
            sub_type: None,
            index: None,
            parameters,
        }
    }
}

/// A template send: name + language + sanitized components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateMessage {
    pub name: String,
    pub language: TemplateLanguage,
    #[serde(default)]
    pub components: Vec<TemplateComponent>,
}

impl TemplateMessage {
    pub fn new<S: Into<String>>(name: S, language_code: S) -> Self {
        Self {
            name: name.into(),
            language: TemplateLanguage::new(language_code),
            components: Vec::new(),
        }
    }

    pub fn with_components(mut self, components: Vec<TemplateComponent>) -> Self {
        self.components = sanitize_components(components);
        self
    }

    /// Cloud API `template` object.
    pub fn to_object(&self) -> Value {
        let mut obj = json!({
            "name": self.name,
            "language": self.language,
        });
        if !self.components.is_empty() {
            obj["components"] = json!(self.components);
        }
        obj
    }
}

/// Drop anything the Cloud API would reject.
///
/// Rules, in order:
/// - a component with no parameters is dropped entirely;
/// - `header` keeps only its first parameter, which must be a well-formed
///   image/video/document/text parameter;
/// - `body` keeps only `text`-typed parameters and is dropped if none remain;
/// - `button` requires both `sub_type` and `index`.
pub fn sanitize_components(components: Vec<TemplateComponent>) -> Vec<TemplateComponent> {
    components
        .into_iter()
        .filter_map(|mut component| {
            if component.parameters.is_empty() {
                return None;
            }
            match component.component_type.as_str() {
                "header" => {
                    let first = component.parameters.into_iter().next()?;
                    if !first.is_valid_media() {
                        return None;
                    }
                    component.parameters = vec![first];
                    Some(component)
                }
                "body" => {
                    component
                        .parameters
                        .retain(|p| p.param_type == "text" && p.text.is_some());
                    if component.parameters.is_empty() {
                        None
                    } else {
                        Some(component)
                    }
                }
                "button" => {
                    if component.sub_type.is_none() || component.index.is_none() {
                        return None;
                    }
                    Some(component)
                }
                _ => Some(component),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_parameterless_components() {
        let components = vec![TemplateComponent::body(vec![])];
        assert!(sanitize_components(components).is_empty());
    }

    #[test]
    fn header_requires_typed_media() {
        let bad = TemplateComponent::header(vec![TemplateParameter {
            param_type: "image".to_string(),
            text: None,
            image: None,
            video: None,
            document: None,
        }]);
        assert!(sanitize_components(vec![bad]).is_empty());

        let good = TemplateComponent::header(vec![TemplateParameter::media_id("image", "m-1")]);
        let out = sanitize_components(vec![good]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].parameters.len(), 1);
    }

    #[test]
    fn body_keeps_only_text_parameters() {
        let component = TemplateComponent::body(vec![
            TemplateParameter::text("a"),
            TemplateParameter::media_id("image", "m-1"),
            TemplateParameter::text("b"),
        ]);
        let out = sanitize_components(vec![component]);
        assert_eq!(out[0].parameters.len(), 2);
        assert!(out[0].parameters.iter().all(|p| p.param_type == "text"));
    }

    #[test]
    fn button_requires_sub_type_and_index() {
        let incomplete = TemplateComponent {
            component_type: "button".to_string(),
            sub_type: Some("quick_reply".to_string()),
            index: None,
            parameters: vec![TemplateParameter::text("payload")],
        };
        assert!(sanitize_components(vec![incomplete]).is_empty());

        let complete = TemplateComponent {
            component_type: "button".to_string(),
            sub_type: Some("quick_reply".to_string()),
            index: Some("0".to_string()),
            parameters: vec![TemplateParameter::text("payload")],
        };
        assert_eq!(sanitize_components(vec![complete]).len(), 1);
    }

    #[test]
    fn header_without_body_is_preserved() {
        // A template can legitimately carry only a media header.
        let components = vec![
            TemplateComponent::header(vec![TemplateParameter::media_id("video", "m-9")]),
            TemplateComponent::body(vec![]),
        ];
        let out = sanitize_components(components);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].component_type, "header");
    }
}
