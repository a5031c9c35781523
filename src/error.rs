//! Error handling and the OpenAI-compatible error taxonomy
//!
//! Every failure the relay can surface is one variant of [`Error`]. The
//! HTTP layer never builds error bodies by hand: it asks the error for its
//! [`ErrorInfo`] and serializes that.

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Missing or malformed Authorization header")]
    MissingCredentials,

    /// Holds the masked key only; build with [`Error::authentication`].
    #[error("Upstream rejected API key {0}")]
    Authentication(String),

    #[error("POST to the root endpoint")]
    WrongEndpoint,

    #[error("Model {0} does not support image inputs")]
    UnsupportedInput(String),

    #[error("Image fetch error: {0}")]
    UpstreamFetch(String),

    #[error("Asset upload error: {0}")]
    AssetUpload(String),

    #[error("Upstream API error (status {status}): {message}")]
    UpstreamHttp { status: u16, message: String },

    #[error("Malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    #[error("Upstream call timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Request body rejected: {0}")]
    PayloadTooLarge(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] dotenvy::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// OpenAI-style error payload plus the HTTP status it travels with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub param: Option<String>,
    pub code: Option<String>,
    #[serde(skip)]
    pub http_status: u16,
}

/// Wire envelope: `{"error": {...}}`.
#[derive(Debug, Serialize)]
pub struct ErrorBody<'a> {
    pub error: &'a ErrorInfo,
}

impl ErrorInfo {
    fn new(
        message: impl Into<String>,
        error_type: &str,
        param: Option<&str>,
        code: Option<&str>,
        http_status: u16,
    ) -> Self {
        Self {
            message: message.into(),
            error_type: error_type.to_string(),
            param: param.map(str::to_string),
            code: code.map(str::to_string),
            http_status,
        }
    }
}

impl Error {
    /// Upstream rejected `api_key`. Only its masked form is kept.
    pub fn authentication(api_key: &str) -> Self {
        Error::Authentication(mask_key(api_key))
    }

    /// Map this error onto the fixed taxonomy.
    pub fn info(&self) -> ErrorInfo {
        match self {
            Error::ModelNotFound(model) => ErrorInfo::new(
                format!("The model {} does not exist.", model),
                "invalid_request_error",
                None,
                Some("model_not_found"),
                400,
            ),
            Error::Authentication(masked) => ErrorInfo::new(
                format!(
                    "Incorrect API key provided: {}. You can find your API key at https://app.1min.ai/api.",
                    masked
                ),
                "authentication_error",
                None,
                Some("invalid_api_key"),
                401,
            ),
            Error::MissingCredentials => ErrorInfo::new(
                "Invalid Authentication",
                "invalid_request_error",
                None,
                None,
                401,
            ),
            Error::WrongEndpoint => ErrorInfo::new(
                "Incorrect Endpoint. Please use the /v1/chat/completions endpoint.",
                "invalid_request_error",
                None,
                Some("model_not_supported"),
                400,
            ),
            Error::UnsupportedInput(_) => ErrorInfo::new(
                "This model does not support image inputs.",
                "invalid_request_error",
                Some("messages"),
                Some("unsupported_input"),
                400,
            ),
            Error::Validation(message) => ErrorInfo::new(
                message.clone(),
                "invalid_request_error",
                Some("messages"),
                Some("validation_error"),
                400,
            ),
            Error::UpstreamFetch(reason) => ErrorInfo::new(
                format!("Failed to fetch image: {}", reason),
                "invalid_request_error",
                Some("messages"),
                Some("image_fetch_failed"),
                400,
            ),
            Error::AssetUpload(reason) => ErrorInfo::new(
                format!("Failed to upload image to the provider: {}", reason),
                "upstream_error",
                None,
                Some("asset_upload_failed"),
                502,
            ),
            Error::UpstreamHttp { status, .. } => ErrorInfo::new(
                format!("The upstream provider returned HTTP {}.", status),
                "upstream_error",
                None,
                Some("upstream_http_error"),
                if (400..600).contains(status) {
                    *status
                } else {
                    502
                },
            ),
            Error::MalformedUpstreamResponse(_) => ErrorInfo::new(
                "The upstream provider returned an unexpected response.",
                "upstream_error",
                None,
                Some("malformed_upstream_response"),
                502,
            ),
            Error::UpstreamTimeout(after) => ErrorInfo::new(
                format!("The upstream provider did not respond within {}s.", after.as_secs()),
                "upstream_error",
                None,
                Some("upstream_timeout"),
                504,
            ),
            Error::RateLimited => ErrorInfo::new(
                "Rate limit exceeded. Please slow down.",
                "rate_limit_error",
                None,
                Some("rate_limit_exceeded"),
                429,
            ),
            Error::PayloadTooLarge(_) => ErrorInfo::new(
                "Request body is too large.",
                "invalid_request_error",
                None,
                Some("request_too_large"),
                413,
            ),
            Error::Http(_) => ErrorInfo::new(
                "Failed to reach the upstream provider.",
                "upstream_error",
                None,
                Some("upstream_unreachable"),
                502,
            ),
            Error::Config(_) | Error::Serialization(_) | Error::Io(_) | Error::EnvVar(_) => {
                ErrorInfo::new("Internal server error.", "server_error", None, None, 500)
            }
        }
    }
}

/// Shorten an API key so it can appear in logs and error messages.
pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}...", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_mapping() {
        let info = Error::ModelNotFound("gpt-9".to_string()).info();
        assert_eq!(info.http_status, 400);
        assert_eq!(info.code.as_deref(), Some("model_not_found"));
        assert_eq!(info.message, "The model gpt-9 does not exist.");
    }

    #[test]
    fn test_authentication_masks_key() {
        let info = Error::authentication("sk-secret-value").info();
        assert_eq!(info.http_status, 401);
        assert!(info.message.contains("sk-s..."));
        assert!(!info.message.contains("secret-value"));
    }

    #[test]
    fn test_display_masks_key() {
        let err = Error::authentication("abcdefgh");
        assert_eq!(err.to_string(), "Upstream rejected API key abcd...");
    }

    #[test]
    fn test_debug_never_contains_full_key() {
        let err = Error::authentication("sk-live-0123456789");
        let debug = format!("{:?}", err);
        assert!(!debug.contains("0123456789"));
        assert!(debug.contains("sk-l..."));
    }

    #[test]
    fn test_payload_too_large_mapping() {
        let info = Error::PayloadTooLarge("length limit exceeded".to_string()).info();
        assert_eq!(info.http_status, 413);
        assert_eq!(info.code.as_deref(), Some("request_too_large"));
    }

    #[test]
    fn test_upstream_status_passthrough() {
        let info = Error::UpstreamHttp {
            status: 503,
            message: "down".to_string(),
        }
        .info();
        assert_eq!(info.http_status, 503);
    }

    #[test]
    fn test_upstream_non_error_status_becomes_bad_gateway() {
        let info = Error::UpstreamHttp {
            status: 302,
            message: String::new(),
        }
        .info();
        assert_eq!(info.http_status, 502);
    }

    #[test]
    fn test_unsupported_input_is_bad_request() {
        let info = Error::UnsupportedInput("mistral-nemo".to_string()).info();
        assert_eq!(info.http_status, 400);
        assert_eq!(info.message, "This model does not support image inputs.");
    }

    #[test]
    fn test_malformed_and_timeout_statuses() {
        assert_eq!(
            Error::MalformedUpstreamResponse("x".to_string()).info().http_status,
            502
        );
        assert_eq!(
            Error::UpstreamTimeout(Duration::from_secs(5)).info().http_status,
            504
        );
    }

    #[test]
    fn test_error_body_shape() {
        let info = Error::Validation("No messages provided".to_string()).info();
        let json = serde_json::to_value(ErrorBody { error: &info }).unwrap();
        assert_eq!(json["error"]["message"], "No messages provided");
        assert_eq!(json["error"]["type"], "invalid_request_error");
        assert_eq!(json["error"]["param"], "messages");
        assert_eq!(json["error"]["code"], "validation_error");
        assert!(json["error"].get("http_status").is_none());
    }

    #[test]
    fn test_mask_short_key() {
        assert_eq!(mask_key("ab"), "ab...");
    }
}
