//! Backend stream decoding.
//!
//! The backend answers `/api/chat` with newline-delimited lines whose two-character prefix
//! names the payload kind:
//!
//! | prefix | payload |
//! |--------|---------|
//! | `g:`   | quoted reasoning text |
//! | `0:`   | quoted answer text |
//! | `e:`   | JSON with `finishReason` |
//! | `d:`   | JSON with `usage.promptTokens` / `usage.completionTokens` |
//!
//! Anything else is ignored. Malformed control lines degrade to defaults and never end
//! the stream.

use std::io;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use serde_json::Value;

const DEFAULT_FINISH_REASON: &str = "stop";

/// One decoded backend line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    ReasoningDelta(String),
    AnswerDelta(String),
    Finish(String),
    Usage {
        prompt_tokens: u64,
        completion_tokens: u64,
    },
}

/// Classify a single line. Returns `None` for empty or unrecognized lines.
pub fn decode_line(line: &str) -> Option<StreamEvent> {
    if let Some(rest) = line.strip_prefix("g:") {
        Some(StreamEvent::ReasoningDelta(unquote_text(rest)))
    } else if let Some(rest) = line.strip_prefix("0:") {
        Some(StreamEvent::AnswerDelta(unquote_text(rest)))
    } else if let Some(rest) = line.strip_prefix("e:") {
        Some(StreamEvent::Finish(finish_reason(rest)))
    } else if let Some(rest) = line.strip_prefix("d:") {
        usage(rest)
    } else {
        None
    }
}

/// Strip one surrounding quote on each side and turn literal `\n` into newlines.
fn unquote_text(raw: &str) -> String {
    let s = raw.strip_prefix('"').unwrap_or(raw);
    let s = s.strip_suffix('"').unwrap_or(s);
    s.replace("\\n", "\n")
}

fn finish_reason(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|v| {
            v.get("finishReason")
                .and_then(|r| r.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_FINISH_REASON.to_string())
}

fn usage(raw: &str) -> Option<StreamEvent> {
    let v: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed usage line");
            return None;
        }
    };
    let usage = v.get("usage").filter(|u| u.is_object())?;
    Some(StreamEvent::Usage {
        prompt_tokens: token_count(usage.get("promptTokens")),
        completion_tokens: token_count(usage.get("completionTokens")),
    })
}

fn token_count(v: Option<&Value>) -> u64 {
    v.and_then(|n| n.as_u64().or_else(|| n.as_f64().map(|f| f.max(0.0) as u64)))
        .unwrap_or(0)
}

/// Split a response body into lines.
///
/// Lines end at `\n` (a trailing `\r` is dropped) and are decoded as lossy UTF-8, so a
/// multi-byte character split across network chunks is reassembled before decoding. A final
/// unterminated line is still yielded. A body error is yielded once and ends the stream.
pub fn lines<S>(body: S) -> impl Stream<Item = io::Result<String>> + Send
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin,
{
    struct State<S> {
        body: S,
        buf: BytesMut,
        // bytes of `buf` already known to hold no newline
        scanned: usize,
        done: bool,
    }

    let init = State {
        body,
        buf: BytesMut::new(),
        scanned: 0,
        done: false,
    };

    stream::unfold(init, |mut st| async move {
        loop {
            if let Some(off) = st.buf[st.scanned..].iter().position(|b| *b == b'\n') {
                let mut line = st.buf.split_to(st.scanned + off + 1);
                st.scanned = 0;
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Some((Ok(String::from_utf8_lossy(&line).into_owned()), st));
            }
            st.scanned = st.buf.len();
            if st.done {
                if st.buf.is_empty() {
                    return None;
                }
                let rest = st.buf.split();
                st.scanned = 0;
                return Some((Ok(String::from_utf8_lossy(&rest).into_owned()), st));
            }
            match st.body.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    st.done = true;
                    st.buf.clear();
                    st.scanned = 0;
                    return Some((Err(e), st));
                }
                None => st.done = true,
            }
        }
    })
}
