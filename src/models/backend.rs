use serde::{Deserialize, Serialize};

/// A typed fragment of a backend message. The gateway only ever produces `"text"` parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".into(),
            text: text.into(),
        }
    }
}

/// Message shape accepted by the backend: the Chat message plus its `parts` elaboration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<MessagePart>,
}

/// Body of `POST {base}/api/chat`.
///
/// `id` and `chat_id` always carry the same session id; `mcp_servers` is reserved by the
/// backend and is always sent empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendChatRequest {
    pub id: String,
    pub messages: Vec<BackendMessage>,
    pub selected_model: String,
    pub mcp_servers: Vec<serde_json::Value>,
    pub chat_id: String,
    pub user_id: String,
}
