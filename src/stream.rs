//! Upstream byte stream → OpenAI chunk events.
//!
//! The provider streams bare text. Each transport chunk is re-emitted as
//! one `chat.completion.chunk` event as soon as it arrives; when the
//! provider closes the stream a final chunk with usage and the `[DONE]`
//! terminator follow.
//!
//! SSE frame: `data: {"choices":[{"delta":{"content":"hi"},"finish_reason":null}],...}\n\n`

use crate::models::{ChunkChoice, Delta, StreamChunk, Usage};
use crate::tokens::count_tokens;
use crate::transform::completion_id;
use crate::upstream::ByteStream;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tracing::{debug, warn};

/// Event stream handed to the HTTP body.
pub type SseStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

const DONE_FRAME: &str = "data: [DONE]\n\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Dispatched, nothing consumed yet.
    Open,
    Emitting,
    Done,
}

/// State threaded through the `unfold` stream.
struct ReformatState {
    upstream: ByteStream,
    phase: Phase,
    id: String,
    created: i64,
    model: String,
    prompt_tokens: u32,
    text: String,
    /// Trailing bytes of a UTF-8 sequence split across transport chunks.
    pending: Vec<u8>,
}

/// Re-emit an upstream byte stream as OpenAI chunk events.
///
/// All chunks of one completion share a single id. A transport error ends
/// the stream with that error and no usage chunk.
pub fn reformat(upstream: ByteStream, model: String, prompt_tokens: u32) -> SseStream {
    let state = ReformatState {
        upstream,
        phase: Phase::Open,
        id: completion_id(),
        created: chrono::Utc::now().timestamp(),
        model,
        prompt_tokens,
        text: String::new(),
        pending: Vec::new(),
    };

    futures_util::stream::unfold(state, |mut st| async move {
        loop {
            match st.phase {
                Phase::Done => return None,
                Phase::Open => st.phase = Phase::Emitting,
                Phase::Emitting => match st.upstream.next().await {
                    Some(Ok(chunk)) => {
                        let text = decode_utf8(&mut st.pending, &chunk);
                        if text.is_empty() {
                            continue;
                        }
                        st.text.push_str(&text);
                        let frame = st.delta_frame(text);
                        return Some((Ok(frame), st));
                    }
                    Some(Err(e)) => {
                        warn!("Upstream stream failed: {}", e);
                        st.phase = Phase::Done;
                        return Some((Err(std::io::Error::other(e)), st));
                    }
                    None => {
                        st.phase = Phase::Done;
                        let frame = st.closing_frames();
                        return Some((Ok(frame), st));
                    }
                },
            }
        }
    })
    .boxed()
}

impl ReformatState {
    fn chunk(&self, content: String, finish_reason: Option<&str>, usage: Option<Usage>) -> StreamChunk {
        StreamChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: Delta { content },
                finish_reason: finish_reason.map(str::to_string),
            }],
            usage,
        }
    }

    fn delta_frame(&self, content: String) -> Bytes {
        Bytes::from(sse_frame(&self.chunk(content, None, None)))
    }

    /// Any held-back bytes, then the usage chunk, then the terminator.
    fn closing_frames(&mut self) -> Bytes {
        let mut out = String::new();

        if !self.pending.is_empty() {
            let rest = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.text.push_str(&rest);
            out.push_str(&sse_frame(&self.chunk(rest, None, None)));
        }

        let completion_tokens = count_tokens(&self.text, &self.model);
        let usage = Usage::new(self.prompt_tokens, completion_tokens);
        debug!(
            "Finished streaming. Completion tokens: {}, total tokens: {}",
            usage.completion_tokens, usage.total_tokens
        );

        out.push_str(&sse_frame(&self.chunk(String::new(), Some("stop"), Some(usage))));
        out.push_str(DONE_FRAME);
        Bytes::from(out)
    }
}

fn sse_frame(chunk: &StreamChunk) -> String {
    // StreamChunk holds only strings and integers, so serialization cannot fail.
    let json = serde_json::to_string(chunk).unwrap_or_default();
    format!("data: {}\n\n", json)
}

/// Decode as much of `pending + bytes` as forms complete UTF-8, keeping an
/// incomplete trailing sequence in `pending`. Invalid bytes are replaced.
fn decode_utf8(pending: &mut Vec<u8>, bytes: &[u8]) -> String {
    pending.extend_from_slice(bytes);
    match std::str::from_utf8(pending) {
        Ok(text) => {
            let text = text.to_string();
            pending.clear();
            text
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            let text = String::from_utf8_lossy(&pending[..valid]).into_owned();
            pending.drain(..valid);
            text
        }
        Err(_) => {
            let text = String::from_utf8_lossy(pending).into_owned();
            pending.clear();
            text
        }
    }
}
