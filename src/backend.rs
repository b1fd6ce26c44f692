use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{BoxStream, StreamExt, TryStreamExt};
use http::header;

use crate::config::Config;
use crate::error::BackendError;
use crate::models::backend::BackendChatRequest;

/// Raw response body of a backend chat call.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// The two calls the gateway makes against the backend.
///
/// `post_chat` fails only on transport errors; an HTTP error status still yields the body
/// so the caller's decoder can drain it.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn post_chat(
        &self,
        session_id: &str,
        payload: &BackendChatRequest,
    ) -> Result<ByteStream, BackendError>;

    async fn delete_chat(&self, session_id: &str, identity: &str) -> Result<(), BackendError>;
}

/// `reqwest`-backed implementation talking to `{base_url}/api/...`.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = crate::util::build_http_client(config)?;
        Ok(Self::new(client, config.base_url.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn referer(&self, session_id: &str) -> String {
        format!("{}/chat/{}", self.base_url, session_id)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn post_chat(
        &self,
        session_id: &str,
        payload: &BackendChatRequest,
    ) -> Result<ByteStream, BackendError> {
        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "*/*")
            .header(header::ORIGIN, &self.base_url)
            .header(header::REFERER, self.referer(session_id))
            .json(payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            tracing::warn!(
                status = %status,
                session_id = %session_id,
                "backend chat returned non-success status"
            );
        }

        Ok(resp
            .bytes_stream()
            .map_err(|e| io::Error::other(e.to_string()))
            .boxed())
    }

    async fn delete_chat(&self, session_id: &str, identity: &str) -> Result<(), BackendError> {
        let resp = self
            .client
            .delete(format!("{}/api/chats/{}", self.base_url, session_id))
            .header("X-User-Id", identity)
            .header(header::ORIGIN, &self.base_url)
            .header(header::REFERER, self.referer(session_id))
            .send()
            .await?;
        if resp.status() != http::StatusCode::OK {
            return Err(BackendError::Status(resp.status()));
        }
        Ok(())
    }
}
