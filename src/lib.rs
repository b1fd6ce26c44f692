#![forbid(unsafe_code)]
#![doc = r#"
Chat2Scira

Serve an OpenAI-compatible Chat Completions API and forward every request to the Scira chat
backend, translating its line-prefixed stream back into Chat Completions JSON or SSE.

Crate highlights
- Library: pure translation via `to_backend_request(&ChatCompletionRequest, ..)` and a
  line decoder (`decoder::decode_line`) for the backend wire format.
- HTTP server (in `server`): `/v1/models`, `/v1/chat/completions` and `/status`.
- Backend seam (`backend::Backend`): the real `reqwest` client lives behind a trait so the
  retry loop and both materializers can be driven without a network.

Modules
- `models`: Inbound/outbound Chat Completions types and the backend request schema.
- `identity`: Rotating identity pool and session id generation.
- `conversion`: Chat request -> backend request mapping.
- `backend`, `invoker`: Outbound calls and the retry loop.
- `decoder`, `materialize`: Line splitting, event decoding, SSE and aggregate responses.
- `cleanup`: Detached backend session deletion.
- `server`, `auth`, `config`, `util`: Axum router, bearer check, env config, tracing/CORS.
"#]

pub mod auth;
pub mod backend;
pub mod cleanup;
pub mod config;
pub mod conversion;
pub mod decoder;
pub mod error;
pub mod identity;
pub mod invoker;
pub mod materialize;
pub mod models;
pub mod server;
pub mod util;

// Re-export the primary translation function for ergonomic library use.
pub use crate::conversion::to_backend_request;

pub use crate::config::Config;
pub use crate::decoder::{decode_line, StreamEvent};
pub use crate::error::{BackendError, GatewayError};
pub use crate::identity::{new_session_id, IdentityPool};

// Re-export model namespaces for convenience (downstream users can do `use chat2scira::chat`).
pub use crate::models::{backend as scira, chat};
