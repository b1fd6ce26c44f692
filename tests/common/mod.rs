#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, post},
    Json, Router,
};
use bytes::Bytes;
use chat2scira::backend::{Backend, ByteStream};
use chat2scira::config::Config;
use chat2scira::models::backend::BackendChatRequest;
use chat2scira::util::AppState;
use chat2scira::{BackendError, IdentityPool};
use futures_util::stream::{self, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Lines used by the end-to-end scenarios: answer, reasoning, finish, usage.
pub const SCENARIO_LINES: [&str; 4] = [
    "0:\"Hi\"",
    "g:\"think\"",
    "e:{\"finishReason\":\"stop\"}",
    "d:{\"usage\":{\"promptTokens\":1,\"completionTokens\":2}}",
];

pub fn join_lines(lines: &[&str]) -> String {
    let mut body = lines.join("\n");
    body.push('\n');
    body
}

/// Build a config from key/value pairs, with a single identity unless overridden.
pub fn test_config(pairs: &[(&str, &str)]) -> Config {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("USERIDS".into(), "user-a".into());
    for (k, v) in pairs {
        env.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|k| env.get(k).cloned()).expect("valid test config")
}

/// State with a deterministic identity rotation starting at the first identity.
pub fn test_state(config: Config, backend: Arc<dyn Backend>) -> AppState {
    let identities =
        IdentityPool::with_offset(config.identities.clone(), 0).expect("non-empty identities");
    AppState {
        config: Arc::new(config),
        identities: Arc::new(identities),
        backend,
    }
}

/// In-memory backend: records every call and fails the first `fail_first` chat posts.
pub struct FakeBackend {
    body: String,
    fail_first: usize,
    posts: Mutex<Vec<(String, BackendChatRequest)>>,
    deletes: Mutex<Vec<(String, String)>>,
}

impl FakeBackend {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            body: join_lines(lines),
            fail_first: 0,
            posts: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn posts(&self) -> Vec<(String, BackendChatRequest)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    /// Wait until at least `n` deletions were recorded (they run on detached tasks).
    pub async fn wait_for_deletes(&self, n: usize) -> Vec<(String, String)> {
        for _ in 0..100 {
            let seen = self.deletes();
            if seen.len() >= n {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.deletes()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn post_chat(
        &self,
        session_id: &str,
        payload: &BackendChatRequest,
    ) -> Result<ByteStream, BackendError> {
        let n = {
            let mut posts = self.posts.lock().unwrap();
            posts.push((session_id.to_string(), payload.clone()));
            posts.len()
        };
        if n <= self.fail_first {
            return Err(BackendError::Transport(
                format!("connection refused (attempt {n})").into(),
            ));
        }
        let chunk: std::io::Result<Bytes> = Ok(Bytes::from(self.body.clone()));
        Ok(stream::iter(vec![chunk]).boxed())
    }

    async fn delete_chat(&self, session_id: &str, identity: &str) -> Result<(), BackendError> {
        self.deletes
            .lock()
            .unwrap()
            .push((session_id.to_string(), identity.to_string()));
        Ok(())
    }
}

/// Backend whose chat body never ends: one answer line every 10ms, counting each line pulled.
#[derive(Default)]
pub struct EndlessBackend {
    pulled: Arc<AtomicUsize>,
    sessions: Mutex<Vec<String>>,
    deletes: Mutex<Vec<(String, String)>>,
}

impl EndlessBackend {
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    pub fn sessions(&self) -> Vec<String> {
        self.sessions.lock().unwrap().clone()
    }

    pub async fn wait_for_deletes(&self, n: usize) -> Vec<(String, String)> {
        for _ in 0..200 {
            let seen = self.deletes.lock().unwrap().clone();
            if seen.len() >= n {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for EndlessBackend {
    async fn post_chat(
        &self,
        session_id: &str,
        _payload: &BackendChatRequest,
    ) -> Result<ByteStream, BackendError> {
        self.sessions.lock().unwrap().push(session_id.to_string());
        let body = stream::unfold(self.pulled.clone(), |pulled| async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            pulled.fetch_add(1, Ordering::SeqCst);
            let line: std::io::Result<Bytes> = Ok(Bytes::from_static(b"0:\"x\"\n"));
            Some((line, pulled))
        });
        Ok(body.boxed())
    }

    async fn delete_chat(&self, session_id: &str, identity: &str) -> Result<(), BackendError> {
        self.deletes
            .lock()
            .unwrap()
            .push((session_id.to_string(), identity.to_string()));
        Ok(())
    }
}

/// What the stub backend saw.
#[derive(Default)]
pub struct Recorded {
    pub chats: Vec<(HeaderMap, serde_json::Value)>,
    pub deletes: Vec<(String, HeaderMap)>,
}

struct StubState {
    body: String,
    recorded: Arc<Mutex<Recorded>>,
}

/// Real HTTP server speaking the backend protocol on an ephemeral port.
///
/// `DELETE /api/chats/{id}` answers 404 for ids starting with `missing`, 200 otherwise.
pub struct BackendStub {
    pub base_url: String,
    recorded: Arc<Mutex<Recorded>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl BackendStub {
    pub async fn start(lines: &[&str]) -> Self {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let state = Arc::new(StubState {
            body: join_lines(lines),
            recorded: recorded.clone(),
        });

        let router = Router::new()
            .route("/api/chat", post(chat_handler))
            .route("/api/chats/:id", delete(delete_handler))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub backend");
        let addr = listener.local_addr().expect("stub backend local addr");
        let (tx, rx) = oneshot::channel::<()>();

        let server = axum::serve(listener, router.into_make_service());
        tokio::spawn(async move {
            tokio::select! {
                res = server => {
                    if let Err(err) = res {
                        eprintln!("Stub backend server error: {err:?}");
                    }
                }
                _ = rx => {}
            }
        });

        BackendStub {
            base_url: format!("http://{}", addr),
            recorded,
            shutdown: Some(tx),
        }
    }

    pub fn recorded(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap()
    }
}

impl Drop for BackendStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn chat_handler(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    state.recorded.lock().unwrap().chats.push((headers, body));
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.body.clone(),
    )
}

async fn delete_handler(
    State(state): State<Arc<StubState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> StatusCode {
    let missing = id.starts_with("missing");
    state.recorded.lock().unwrap().deletes.push((id, headers));
    if missing {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    }
}
