//! Data models for the OpenAI-compatible surface and the Scira backend.
//!
//! This module groups two submodules:
//! - `chat`: The subset of the OpenAI Chat Completions request/response models the gateway
//!   accepts and emits.
//! - `backend`: The request body the Scira `/api/chat` endpoint expects.
//!
//! The mapping from `chat::ChatCompletionRequest` to `backend::BackendChatRequest` is
//! implemented in `crate::conversion`.

pub mod backend;
pub mod chat;

pub use backend::{BackendChatRequest, BackendMessage, MessagePart};
pub use chat::{
    ChatChoice, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatDelta,
    ChatMessage, ChatResponseMessage, ChatStreamChoice, ChatUsage, ModelList, ModelObject,
};
