//! Non-streaming response transformation.

use crate::models::{AssistantMessage, CompletionChoice, CompletionResponse, Usage};
use crate::tokens::count_tokens;
use crate::{Error, Result};
use uuid::Uuid;

const RESULT_POINTER: &str = "/aiRecord/aiRecordDetail/resultObject/0";

pub fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4())
}

/// Pull the assistant text out of a 1min.ai features reply.
pub fn extract_result_text(doc: &serde_json::Value) -> Result<&str> {
    doc.pointer(RESULT_POINTER)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            Error::MalformedUpstreamResponse(
                "missing aiRecord.aiRecordDetail.resultObject[0]".to_string(),
            )
        })
}

pub fn transform_response(
    doc: &serde_json::Value,
    model: &str,
    prompt_tokens: u32,
) -> Result<CompletionResponse> {
    let content = extract_result_text(doc)?;
    let completion_tokens = count_tokens(content, model);

    Ok(CompletionResponse {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model: model.to_string(),
        choices: vec![CompletionChoice {
            index: 0,
            message: AssistantMessage {
                role: "assistant".to_string(),
                content: content.to_string(),
            },
            finish_reason: "stop".to_string(),
        }],
        usage: Usage::new(prompt_tokens, completion_tokens),
    })
}
