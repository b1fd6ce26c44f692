//! Turn decoded backend events into Chat Completions output.
//!
//! Both materializers consume the same line stream and poll the client link once per line:
//! when the caller has gone away they stop without producing anything further.

use std::io;

use bytes::Bytes;
use futures_util::stream::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::decoder::{decode_line, StreamEvent};
use crate::identity::new_completion_id;
use crate::models::chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionResponse, ChatDelta, ChatResponseMessage,
    ChatStreamChoice, ChatUsage,
};

pub const DONE_FRAME: &[u8] = b"data: [DONE]\n\n";

const ASSISTANT: &str = "assistant";

/// Identity of one outbound response, shared by all of its chunks.
#[derive(Debug, Clone)]
pub struct CompletionMeta {
    pub id: String,
    pub model: String,
    pub created: i64,
}

impl CompletionMeta {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: new_completion_id(),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
        }
    }
}

/// Build the chunk for a single event. Usage events produce a chunk with no choices.
pub fn chunk_for_event(meta: &CompletionMeta, event: StreamEvent) -> ChatCompletionChunk {
    let (choices, usage) = match event {
        StreamEvent::AnswerDelta(text) => (
            vec![delta_choice(ChatDelta {
                role: Some(ASSISTANT.into()),
                content: Some(text),
                ..Default::default()
            })],
            None,
        ),
        StreamEvent::ReasoningDelta(text) => (
            vec![delta_choice(ChatDelta {
                role: Some(ASSISTANT.into()),
                reasoning_content: Some(text),
                ..Default::default()
            })],
            None,
        ),
        StreamEvent::Finish(reason) => (
            vec![ChatStreamChoice {
                index: 0,
                delta: ChatDelta::default(),
                finish_reason: Some(reason),
            }],
            None,
        ),
        StreamEvent::Usage {
            prompt_tokens,
            completion_tokens,
        } => (
            Vec::new(),
            Some(ChatUsage::new(prompt_tokens, completion_tokens)),
        ),
    };
    ChatCompletionChunk {
        id: meta.id.clone(),
        object: "chat.completion.chunk".into(),
        created: meta.created,
        model: meta.model.clone(),
        choices,
        usage,
    }
}

fn delta_choice(delta: ChatDelta) -> ChatStreamChoice {
    ChatStreamChoice {
        index: 0,
        delta,
        finish_reason: None,
    }
}

/// Encode a chunk as one SSE frame: `data: <json>\n\n`.
pub fn sse_frame(chunk: &ChatCompletionChunk) -> Result<Bytes, serde_json::Error> {
    let json = serde_json::to_string(chunk)?;
    Ok(Bytes::from(format!("data: {json}\n\n")))
}

/// Forward every decoded event to `tx` as an SSE frame, then `[DONE]`.
///
/// A closed channel means the client disconnected: processing stops at the next line and
/// no `[DONE]` is sent. A body error ends the scan like EOF does.
pub async fn stream_events<S>(lines: S, meta: CompletionMeta, tx: mpsc::Sender<Bytes>)
where
    S: Stream<Item = io::Result<String>>,
{
    let mut lines = std::pin::pin!(lines);
    while let Some(line) = lines.next().await {
        if tx.is_closed() {
            tracing::debug!(id = %meta.id, "client disconnected, abandoning stream");
            return;
        }
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(id = %meta.id, error = %e, "backend stream ended with error");
                break;
            }
        };
        let Some(event) = decode_line(&line) else {
            continue;
        };
        let frame = match sse_frame(&chunk_for_event(&meta, event)) {
            Ok(f) => f,
            Err(e) => {
                tracing::error!(id = %meta.id, error = %e, "failed to encode stream chunk");
                continue;
            }
        };
        if tx.send(frame).await.is_err() {
            tracing::debug!(id = %meta.id, "client disconnected, abandoning stream");
            return;
        }
    }
    let _ = tx.send(Bytes::from_static(DONE_FRAME)).await;
}

/// Running totals for the non-streaming response.
#[derive(Debug, Default)]
pub struct Aggregate {
    content: String,
    reasoning: String,
    finish_reason: Option<String>,
    usage: ChatUsage,
}

impl Aggregate {
    pub fn push(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::AnswerDelta(text) => self.content.push_str(&text),
            StreamEvent::ReasoningDelta(text) => self.reasoning.push_str(&text),
            StreamEvent::Finish(reason) => self.finish_reason = Some(reason),
            StreamEvent::Usage {
                prompt_tokens,
                completion_tokens,
            } => self.usage = ChatUsage::new(prompt_tokens, completion_tokens),
        }
    }

    pub fn into_response(self, meta: &CompletionMeta) -> ChatCompletionResponse {
        let reasoning_content = if self.reasoning.is_empty() {
            None
        } else {
            Some(self.reasoning)
        };
        ChatCompletionResponse {
            id: meta.id.clone(),
            object: "chat.completion".into(),
            created: meta.created,
            model: meta.model.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatResponseMessage {
                    role: ASSISTANT.into(),
                    content: self.content,
                    reasoning_content,
                },
                finish_reason: Some(self.finish_reason.unwrap_or_else(|| "stop".into())),
            }],
            usage: self.usage,
        }
    }
}

/// Drain the line stream into one response. Returns `None` if `client_gone` reports a
/// disconnect before the stream ends.
pub async fn aggregate_events<S, F>(
    lines: S,
    meta: &CompletionMeta,
    client_gone: F,
) -> Option<ChatCompletionResponse>
where
    S: Stream<Item = io::Result<String>>,
    F: Fn() -> bool,
{
    let mut lines = std::pin::pin!(lines);
    let mut acc = Aggregate::default();
    while let Some(line) = lines.next().await {
        if client_gone() {
            tracing::debug!(id = %meta.id, "client disconnected, abandoning aggregation");
            return None;
        }
        match line {
            Ok(l) => {
                if let Some(event) = decode_line(&l) {
                    acc.push(event);
                }
            }
            Err(e) => {
                tracing::warn!(id = %meta.id, error = %e, "backend stream ended with error");
                break;
            }
        }
    }
    Some(acc.into_response(meta))
}
