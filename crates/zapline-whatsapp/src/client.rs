//! WhatsApp Cloud API client
//!
//! One [`CloudApiClient`] serves every tenant; credentials travel with each
//! call. Requests carry bounded timeouts (10 s for message and media calls,
//! 60 s for uploads) and every non-2xx response surfaces the provider's own
//! error message so callers can persist it verbatim.

use crate::messages::MessageEnvelope;
use crate::template::TemplateComponent;
use reqwest::{multipart, Client as HttpClient, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-tenant Cloud API credentials.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub access_token: String,
    pub phone_number_id: String,
    pub business_account_id: String,
}

/// Result of a successful send.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub provider_message_id: String,
}

/// Media metadata returned by the provider for a media id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub id: String,
    pub url: String,
    pub mime_type: String,
    pub file_size: u64,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// An approved (or pending) template as listed by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTemplate {
    pub id: Option<String>,
    pub name: String,
    pub language: String,
    pub status: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub components: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    messages: Vec<SentMessageId>,
}

#[derive(Debug, Deserialize)]
struct SentMessageId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TemplateListResponse {
    #[serde(default)]
    data: Vec<RemoteTemplate>,
}

#[derive(Debug, Deserialize)]
struct UploadSessionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UploadHandleResponse {
    h: String,
}

/// Cloud API client shared across tenants.
#[derive(Debug, Clone)]
pub struct CloudApiClient {
    http: HttpClient,
    upload_http: HttpClient,
    base_url: String,
    api_version: String,
}

impl CloudApiClient {
    pub fn new(api_version: impl Into<String>) -> Result<Self, WhatsAppError> {
        let http = HttpClient::builder()
            .user_agent("zapline/0.1.0")
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;
        let upload_http = HttpClient::builder()
            .user_agent("zapline/0.1.0")
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            upload_http,
            base_url: DEFAULT_GRAPH_BASE.to_string(),
            api_version: api_version.into(),
        })
    }

    /// Override the Graph base URL (tests point this at a local server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.api_version, path)
    }

    /// Send one message envelope to one recipient.
    ///
    /// Returns the provider message id on 2xx; any other outcome is an error
    /// and nothing was sent.
    pub async fn send(
        &self,
        credentials: &ProviderCredentials,
        to: &str,
        envelope: &MessageEnvelope,
    ) -> Result<SendOutcome, WhatsAppError> {
        let url = self.url(&format!("{}/messages", credentials.phone_number_id));
        let payload = envelope.to_payload(to);

        debug!(to, kind = envelope.kind(), "sending message");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        let parsed: SendResponse = Self::handle_response(response).await?;
        let id = parsed
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| WhatsAppError::ParseError("response carried no message id".into()))?;

        Ok(SendOutcome {
            provider_message_id: id,
        })
    }

    /// Resolve the download URL for an inbound media id.
    pub async fn media_url(
        &self,
        credentials: &ProviderCredentials,
        media_id: &str,
    ) -> Result<MediaInfo, WhatsAppError> {
        let url = self.url(media_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&credentials.access_token)
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        Self::handle_response(response).await
    }

    /// Download media bytes from a URL previously returned by [`Self::media_url`].
    pub async fn download_media(
        &self,
        credentials: &ProviderCredentials,
        media_url: &str,
    ) -> Result<Vec<u8>, WhatsAppError> {
        let response = self
            .upload_http
            .get(media_url)
            .bearer_auth(&credentials.access_token)
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            error!(status, "media download failed");
            return Err(WhatsAppError::HttpError {
                status,
                message: "media download failed".to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    /// Upload media bytes to the tenant's phone number, returning a media id
    /// usable in message envelopes.
    pub async fn upload_media(
        &self,
        credentials: &ProviderCredentials,
        data: Vec<u8>,
        filename: &str,
        mime_type: &str,
    ) -> Result<String, WhatsAppError> {
        let url = self.url(&format!("{}/media", credentials.phone_number_id));

        let part = multipart::Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|e| WhatsAppError::InvalidFile(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("type", mime_type.to_string())
            .text("messaging_product", "whatsapp");

        let response = self
            .upload_http
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        #[derive(Deserialize)]
        struct MediaUpload {
            id: String,
        }
        let parsed: MediaUpload = Self::handle_response(response).await?;
        Ok(parsed.id)
    }

    /// Mark an inbound message as read on the customer's device.
    pub async fn mark_read(
        &self,
        credentials: &ProviderCredentials,
        provider_message_id: &str,
    ) -> Result<(), WhatsAppError> {
        let url = self.url(&format!("{}/messages", credentials.phone_number_id));
        let body = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": provider_message_id,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        let _: Value = Self::handle_response(response).await?;
        Ok(())
    }

    /// List the tenant's message templates.
    pub async fn list_templates(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Vec<RemoteTemplate>, WhatsAppError> {
        let url = self.url(&format!(
            "{}/message_templates",
            credentials.business_account_id
        ));

        let response = self
            .http
            .get(&url)
            .bearer_auth(&credentials.access_token)
            .query(&[("limit", "100")])
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        let parsed: TemplateListResponse = Self::handle_response(response).await?;
        Ok(parsed.data)
    }

    /// Create a template on the tenant's business account.
    pub async fn create_template(
        &self,
        credentials: &ProviderCredentials,
        name: &str,
        language: &str,
        category: &str,
        components: &[Value],
    ) -> Result<Value, WhatsAppError> {
        let url = self.url(&format!(
            "{}/message_templates",
            credentials.business_account_id
        ));
        let body = json!({
            "name": name,
            "language": language,
            "category": category,
            "components": components,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        Self::handle_response(response).await
    }

    /// Delete a template by name.
    pub async fn delete_template(
        &self,
        credentials: &ProviderCredentials,
        name: &str,
    ) -> Result<(), WhatsAppError> {
        let url = self.url(&format!(
            "{}/message_templates",
            credentials.business_account_id
        ));

        let response = self
            .http
            .delete(&url)
            .bearer_auth(&credentials.access_token)
            .query(&[("name", name)])
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        let _: Value = Self::handle_response(response).await?;
        Ok(())
    }

    /// Step one of the resumable upload used for template header media:
    /// open an upload session for a file of known length and type.
    pub async fn create_upload_session(
        &self,
        credentials: &ProviderCredentials,
        file_name: &str,
        file_length: u64,
        file_type: &str,
    ) -> Result<String, WhatsAppError> {
        let url = self.url(&format!("{}/uploads", credentials.business_account_id));

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credentials.access_token)
            .query(&[
                ("file_name", file_name),
                ("file_length", &file_length.to_string()),
                ("file_type", file_type),
            ])
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        let parsed: UploadSessionResponse = Self::handle_response(response).await?;
        Ok(parsed.id)
    }

    /// Step two of the resumable upload: push the bytes into the session.
    /// Returns the opaque header handle referenced by template components.
    pub async fn upload_file_handle(
        &self,
        credentials: &ProviderCredentials,
        upload_session_id: &str,
        data: Vec<u8>,
    ) -> Result<String, WhatsAppError> {
        let url = format!("{}/{}", self.base_url, upload_session_id);

        let response = self
            .upload_http
            .post(&url)
            .header("Authorization", format!("OAuth {}", credentials.access_token))
            .header("file_offset", "0")
            .body(data)
            .send()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        let parsed: UploadHandleResponse = Self::handle_response(response).await?;
        Ok(parsed.h)
    }

    /// Build the sanitized template components for a broadcast recipient:
    /// header media first when attached, then body parameters in slot order.
    pub fn broadcast_components(
        header_media: Option<(&str, &str)>,
        body_values: &[String],
    ) -> Vec<TemplateComponent> {
        use crate::template::{sanitize_components, TemplateParameter};

        let mut components = Vec::new();
        if let Some((media_type, media_id)) = header_media {
            components.push(TemplateComponent::header(vec![
                TemplateParameter::media_id(media_type, media_id),
            ]));
        }
        if !body_values.is_empty() {
            let parameters = body_values
                .iter()
                .map(|v| {
                    // Empty values collapse the positional slot; "-" keeps the
                    // parameter count aligned with the approved template.
                    let value = if v.trim().is_empty() { "-" } else { v.as_str() };
                    TemplateParameter::text(value)
                })
                .collect();
            components.push(TemplateComponent::body(parameters));
        }
        sanitize_components(components)
    }

    async fn handle_response<T>(response: Response) -> Result<T, WhatsAppError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WhatsAppError::HttpClient(e.to_string()))?;

        if status.is_success() {
            serde_json::from_str(&body).map_err(|e| WhatsAppError::ParseError(e.to_string()))
        } else {
            match serde_json::from_str::<ProviderErrorBody>(&body) {
                Ok(parsed) => {
                    error!(
                        status = status.as_u16(),
                        code = parsed.error.code,
                        "provider error: {}",
                        parsed.error.message
                    );
                    Err(WhatsAppError::ApiError(parsed.error.message))
                }
                Err(_) => {
                    error!(status = status.as_u16(), "provider returned {}", body);
                    Err(WhatsAppError::HttpError {
                        status: status.as_u16(),
                        message: body,
                    })
                }
            }
        }
    }
}

/// Validate that a media URL is http(s) and well-formed; the provider
/// rejects anything else with an opaque error.
pub fn validate_media_url(url: &str) -> Result<&str, WhatsAppError> {
    match Url::parse(url) {
        Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => Ok(url),
        Ok(parsed) => Err(WhatsAppError::InvalidUrl(format!(
            "unsupported scheme {}: {url}",
            parsed.scheme()
        ))),
        Err(_) => Err(WhatsAppError::InvalidUrl(format!("invalid URL: {url}"))),
    }
}

/// WhatsApp API errors.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),
    #[error("HTTP error {status}: {message}")]
    HttpError { status: u16, message: String },
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid file: {0}")]
    InvalidFile(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl WhatsAppError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            WhatsAppError::HttpClient(_) => true,
            WhatsAppError::HttpError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_components_orders_header_first() {
        let components = CloudApiClient::broadcast_components(
            Some(("image", "media-1")),
            &["Alice".to_string(), "".to_string()],
        );

        assert_eq!(components.len(), 2);
        assert_eq!(components[0].component_type, "header");
        assert_eq!(components[1].component_type, "body");
        // The empty slot was coerced so the parameter count is stable.
        assert_eq!(components[1].parameters[1].text.as_deref(), Some("-"));
    }

    #[test]
    fn broadcast_components_header_only() {
        let components = CloudApiClient::broadcast_components(Some(("video", "m-2")), &[]);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].component_type, "header");
    }

    #[test]
    fn media_url_validation() {
        assert!(validate_media_url("https://example.com/a.jpg").is_ok());
        assert!(validate_media_url("http://example.com/doc.pdf").is_ok());
        assert!(validate_media_url("ftp://example.com/x").is_err());
        assert!(validate_media_url("not a url").is_err());
    }

    #[test]
    fn transient_classification() {
        assert!(WhatsAppError::HttpClient("timeout".into()).is_transient());
        assert!(WhatsAppError::HttpError {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!WhatsAppError::ApiError("bad param".into()).is_transient());
    }
}
