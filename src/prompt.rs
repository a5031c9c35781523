//! Request normalization
//!
//! The upstream provider accepts one prompt string, not a message list, so
//! the conversation is linearized here. Validation that must happen before
//! any network call also lives here.

use crate::config::Config;
use crate::models::{ChatMessage, ChatRequest};
use crate::{Error, Result};

const HISTORY_HEADER: &str = "Conversation History:\n";
const ECHO_GUARD: &str = "Respond like normal. The conversation history will be automatically updated on the next MESSAGE. DO NOT ADD User: or Assistant: to your output. Just respond like normal.";
const USER_MESSAGE_HEADER: &str = "User Message:\n";

/// A validated request, ready for asset upload and dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRequest {
    pub model: String,
    pub prompt: String,
    /// Text of the final turn, parts joined with newlines.
    pub user_input: String,
    /// Image references from the final turn, in encounter order.
    pub images: Vec<String>,
    pub stream: bool,
}

impl NormalizedRequest {
    pub fn is_multimodal(&self) -> bool {
        !self.images.is_empty()
    }
}

pub fn normalize(request: &ChatRequest, config: &Config) -> Result<NormalizedRequest> {
    let last = request
        .messages
        .last()
        .ok_or_else(|| Error::Validation("No messages provided".to_string()))?;

    let content = last
        .content
        .as_ref()
        .filter(|content| !content.is_empty())
        .ok_or_else(|| Error::Validation("No content in the last message".to_string()))?;

    let model = request.model();
    if !config.is_permitted(model) {
        return Err(Error::ModelNotFound(model.to_string()));
    }

    Ok(NormalizedRequest {
        model: model.to_string(),
        prompt: format_conversation_history(
            &request.messages,
            request.new_input.as_deref().unwrap_or_default(),
        ),
        user_input: content.text(),
        images: content.image_urls().into_iter().map(str::to_string).collect(),
        stream: request.stream,
    })
}

/// Render the history as `Role: content` lines between a fixed header and
/// the echo guard, followed by `new_input`.
pub fn format_conversation_history(messages: &[ChatMessage], new_input: &str) -> String {
    let mut lines = Vec::with_capacity(messages.len() + 3);
    lines.push(HISTORY_HEADER.to_string());

    for message in messages {
        let content = message
            .content
            .as_ref()
            .map(|content| content.text())
            .unwrap_or_default();
        lines.push(format!("{}: {}", capitalize(&message.role), content));
    }

    lines.push(ECHO_GUARD.to_string());
    lines.push(format!("{}{}", USER_MESSAGE_HEADER, new_input));
    lines.join("\n")
}

/// `"ASSISTANT"` -> `"Assistant"`.
fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentPart, ImageUrl, MessageContent};

    fn text_message(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: Some(MessageContent::Text(content.to_string())),
        }
    }

    fn request(messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            messages,
            model: None,
            stream: false,
            new_input: None,
        }
    }

    #[test]
    fn test_format_history_layout() {
        let messages = vec![
            text_message("system", "Be nice."),
            text_message("user", "Hello"),
        ];

        let prompt = format_conversation_history(&messages, "");
        let expected = format!(
            "Conversation History:\n\nSystem: Be nice.\nUser: Hello\n{}\nUser Message:\n",
            ECHO_GUARD
        );
        assert_eq!(prompt, expected);
    }

    #[test]
    fn test_format_history_appends_new_input() {
        let prompt = format_conversation_history(&[text_message("user", "Hi")], "extra");
        assert!(prompt.ends_with("User Message:\nextra"));
    }

    #[test]
    fn test_format_is_deterministic() {
        let messages = vec![
            text_message("user", "One"),
            text_message("assistant", "Two"),
            text_message("user", "Three"),
        ];
        assert_eq!(
            format_conversation_history(&messages, "x"),
            format_conversation_history(&messages, "x")
        );
    }

    #[test]
    fn test_capitalize_roles() {
        assert_eq!(capitalize("assistant"), "Assistant");
        assert_eq!(capitalize("USER"), "User");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_no_messages_rejected() {
        let err = normalize(&request(vec![]), &Config::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "No messages provided"));
    }

    #[test]
    fn test_empty_last_content_rejected() {
        let err = normalize(&request(vec![text_message("user", "")]), &Config::default())
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ref m) if m == "No content in the last message"));

        let missing = ChatMessage {
            role: "user".to_string(),
            content: None,
        };
        assert!(normalize(&request(vec![missing]), &Config::default()).is_err());
    }

    #[test]
    fn test_model_outside_subset_rejected() {
        let config = Config {
            subset_only: true,
            permitted_models: vec!["gpt-4o".to_string()],
            ..Config::default()
        };
        let mut req = request(vec![text_message("user", "Hello")]);
        req.model = Some("claude-2.1".to_string());

        let err = normalize(&req, &config).unwrap_err();
        assert!(matches!(err, Error::ModelNotFound(ref m) if m == "claude-2.1"));
    }

    #[test]
    fn test_multimodal_classification() {
        let message = ChatMessage {
            role: "user".to_string(),
            content: Some(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "Describe".to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "https://example.com/1.png".to_string(),
                    },
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: "https://example.com/2.png".to_string(),
                    },
                },
            ])),
        };

        let normalized = normalize(&request(vec![message]), &Config::default()).unwrap();
        assert!(normalized.is_multimodal());
        assert_eq!(normalized.user_input, "Describe");
        assert_eq!(
            normalized.images,
            vec!["https://example.com/1.png", "https://example.com/2.png"]
        );
        assert!(normalized.prompt.contains("User: Describe"));
    }

    #[test]
    fn test_text_only_request() {
        let normalized =
            normalize(&request(vec![text_message("user", "Hello")]), &Config::default()).unwrap();
        assert!(!normalized.is_multimodal());
        assert_eq!(normalized.model, "mistral-nemo");
        assert_eq!(normalized.user_input, "Hello");
    }
}
