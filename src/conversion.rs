use crate::models::backend::{BackendChatRequest, BackendMessage, MessagePart};
use crate::models::chat::{ChatCompletionRequest, ChatMessage};

/// Map a Chat message onto the backend shape; `parts` is always a single text part
/// mirroring `content`.
pub fn to_backend_message(msg: &ChatMessage) -> BackendMessage {
    BackendMessage {
        role: msg.role.clone(),
        content: msg.content.clone(),
        parts: vec![MessagePart::text(msg.content.clone())],
    }
}

/// Build the `/api/chat` body for one attempt.
///
/// Pure mapping with no validation: model membership and non-empty messages are checked by
/// the caller before any attempt is made.
pub fn to_backend_request(
    req: &ChatCompletionRequest,
    model: &str,
    session_id: &str,
    identity: &str,
) -> BackendChatRequest {
    BackendChatRequest {
        id: session_id.to_string(),
        messages: req.messages.iter().map(to_backend_message).collect(),
        selected_model: model.to_string(),
        mcp_servers: Vec::new(),
        chat_id: session_id.to_string(),
        user_id: identity.to_string(),
    }
}
