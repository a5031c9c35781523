//! Upstream provider integration
//!
//! Everything that talks to the 1min.ai API sits behind [`UpstreamService`]:
//! fetching caller-referenced images, registering them in the provider's
//! asset store, and dispatching chat features either blocking or streamed.

pub mod client;
pub mod mime;
pub mod mock;

pub use client::OneMinClient;
pub use mock::{MockCounters, MockUpstream};

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::Serialize;

/// Raw upstream reply body, chunked as the transport delivered it.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

#[async_trait]
pub trait UpstreamService: Send + Sync {
    /// Download a remote image referenced by the caller.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>>;
    /// Register image bytes with the provider's asset store.
    async fn upload_asset(&self, data: Vec<u8>, api_key: &str) -> Result<UploadedAsset>;
    /// Blocking dispatch; returns the complete reply document.
    async fn complete(&self, payload: &ProviderPayload, api_key: &str)
        -> Result<serde_json::Value>;
    /// Streaming dispatch; returns the open reply body.
    async fn stream(&self, payload: &ProviderPayload, api_key: &str) -> Result<ByteStream>;
}

/// Provider-relative path of an uploaded image. Opaque to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub handle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayloadKind {
    #[serde(rename = "CHAT_WITH_AI")]
    Text,
    #[serde(rename = "CHAT_WITH_IMAGE")]
    Image,
}

/// Request body for the provider's features endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderPayload {
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    pub model: String,
    #[serde(rename = "promptObject")]
    pub prompt_object: PromptObject,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptObject {
    pub prompt: String,
    pub is_mixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_list: Option<Vec<String>>,
}

impl ProviderPayload {
    /// Build a payload; the kind is `Image` exactly when assets are attached.
    pub fn new(model: &str, prompt: String, assets: Vec<UploadedAsset>) -> Self {
        let prompt_object = if assets.is_empty() {
            PromptObject {
                prompt,
                is_mixed: false,
                web_search: Some(false),
                image_list: None,
            }
        } else {
            PromptObject {
                prompt,
                is_mixed: false,
                web_search: None,
                image_list: Some(assets.into_iter().map(|a| a.handle).collect()),
            }
        };

        let kind = if prompt_object.image_list.is_some() {
            PayloadKind::Image
        } else {
            PayloadKind::Text
        };

        Self {
            kind,
            model: model.to_string(),
            prompt_object,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_payload_shape() {
        let payload = ProviderPayload::new("mistral-nemo", "hi".to_string(), vec![]);
        assert_eq!(payload.kind, PayloadKind::Text);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "type": "CHAT_WITH_AI",
                "model": "mistral-nemo",
                "promptObject": {
                    "prompt": "hi",
                    "isMixed": false,
                    "webSearch": false
                }
            })
        );
    }

    #[test]
    fn test_image_payload_shape() {
        let assets = vec![
            UploadedAsset {
                handle: "images/a.png".to_string(),
            },
            UploadedAsset {
                handle: "images/b.png".to_string(),
            },
        ];
        let payload = ProviderPayload::new("gpt-4o", "look".to_string(), assets);
        assert_eq!(payload.kind, PayloadKind::Image);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "CHAT_WITH_IMAGE");
        assert_eq!(
            json["promptObject"]["imageList"],
            serde_json::json!(["images/a.png", "images/b.png"])
        );
        assert!(json["promptObject"].get("webSearch").is_none());
    }
}
