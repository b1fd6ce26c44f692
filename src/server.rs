use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, State},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::StreamExt;
use http::{header, StatusCode};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::cleanup::Cleanup;
use crate::config::Config;
use crate::decoder::lines;
use crate::error::GatewayError;
use crate::invoker::invoke;
use crate::materialize::{aggregate_events, stream_events, CompletionMeta};
use crate::models::chat::{ChatCompletionRequest, ModelList};
use crate::util::{cors_layer_from_env, AppState};

/// Frames buffered between the stream pump and the response body.
const SSE_CHANNEL_CAPACITY: usize = 32;

/// Build the Axum router with `/v1/models`, `/v1/chat/completions` and `/status`.
pub fn build_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let api = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/status", get(status))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer_from_env())
}

/// Service status endpoint exposing the served configuration.
async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "name": "chat2scira",
        "version": env!("CARGO_PKG_VERSION"),
        "models": state.config.models.len(),
        "identities": state.identities.len(),
        "chat_delete": state.config.cleanup_enabled,
        "routes": ["/status", "/v1/models", "/v1/chat/completions"]
    }))
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(ModelList::from_ids(
        &state.config.models,
        chrono::Utc::now().timestamp(),
    ))
}

/// Reject requests the backend cannot serve before any attempt is made.
pub fn validate_request(req: &ChatCompletionRequest, config: &Config) -> Result<(), GatewayError> {
    if req.model.is_empty() {
        return Err(GatewayError::InvalidRequest("model is required".into()));
    }
    if !config.supports_model(&req.model) {
        return Err(GatewayError::InvalidRequest("model is not supported".into()));
    }
    if req.messages.is_empty() {
        return Err(GatewayError::InvalidRequest("messages is required".into()));
    }
    Ok(())
}

/// Translate, send with retry, then answer as SSE or a single JSON body.
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "bad chat request body");
            return GatewayError::InvalidRequest(rejection.body_text()).into_response();
        }
    };
    if let Err(e) = validate_request(&req, &state.config) {
        tracing::warn!(model = %req.model, error = %e, "chat request rejected");
        return e.into_response();
    }

    let invocation = match invoke(
        state.backend.as_ref(),
        &state.identities,
        &req,
        state.config.retry,
    )
    .await
    {
        Ok(inv) => inv,
        Err(e) => {
            tracing::error!(
                attempts = state.config.retry,
                error = %e,
                "backend still failing after all attempts"
            );
            return GatewayError::from(e).into_response();
        }
    };

    let cleanup = state.config.cleanup_enabled.then(|| {
        Cleanup::new(
            state.backend.clone(),
            invocation.session_id.clone(),
            invocation.identity.clone(),
        )
    });
    let meta = CompletionMeta::new(req.model.clone());
    let body_lines = lines(invocation.body);

    if req.stream {
        stream_response(body_lines, meta, cleanup)
    } else {
        aggregate_response(body_lines, meta, cleanup).await
    }
}

fn stream_response<S>(body_lines: S, meta: CompletionMeta, cleanup: Option<Cleanup>) -> Response
where
    S: futures_util::Stream<Item = std::io::Result<String>> + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Bytes>(SSE_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        stream_events(body_lines, meta, tx).await;
        if let Some(c) = cleanup {
            c.spawn();
        }
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

async fn aggregate_response<S>(
    body_lines: S,
    meta: CompletionMeta,
    cleanup: Option<Cleanup>,
) -> Response
where
    S: futures_util::Stream<Item = std::io::Result<String>> + Send + 'static,
{
    // The receiver lives in this handler future; hyper drops it when the client goes away.
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let resp = aggregate_events(body_lines, &meta, || tx.is_closed()).await;
        if let Some(resp) = resp {
            let _ = tx.send(resp);
        }
        if let Some(c) = cleanup {
            c.spawn();
        }
    });

    match rx.await {
        Ok(resp) => Json(resp).into_response(),
        // Only reachable when the client already left.
        Err(_) => StatusCode::NO_CONTENT.into_response(),
    }
}
