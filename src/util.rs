use std::sync::Arc;

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use tracing_subscriber::{fmt, EnvFilter};

use crate::backend::{Backend, HttpBackend};
use crate::config::Config;
use crate::identity::IdentityPool;

/// Initialize dotenv and structured tracing based on RUST_LOG.
/// - Supports an explicit env file path via ENV_FILE
/// - Falls back to default .env discovery
/// - Logs the source used
pub fn init_tracing() {
    let mut env_source: String = "none".into();
    if let Ok(p) = std::env::var("ENV_FILE") {
        let p = p.trim();
        if !p.is_empty() && std::path::Path::new(p).is_file() && dotenvy::from_filename(p).is_ok()
        {
            env_source = format!("{p} (ENV_FILE)");
        }
    }
    if env_source == "none" {
        if let Ok(path) = dotenvy::dotenv() {
            env_source = path.display().to_string();
        }
    }

    // Initialize tracing (respects RUST_LOG potentially provided by the env file)
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=info".into());
    let subscriber = fmt().with_env_filter(EnvFilter::new(filter)).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    tracing::info!("Environment loaded from: {}", env_source);
}

/// Shared application state used by the HTTP server and handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub identities: Arc<IdentityPool>,
    pub backend: Arc<dyn Backend>,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn Backend>) -> anyhow::Result<Self> {
        let identities = IdentityPool::new(config.identities.clone())?;
        Ok(Self {
            config: Arc::new(config),
            identities: Arc::new(identities),
            backend,
        })
    }

    /// State wired to the real backend over HTTP.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let backend = HttpBackend::from_config(&config)?;
        Self::new(config, Arc::new(backend))
    }
}

/// Build the outbound HTTP client: overall timeout, the configured proxy (or none), user agent.
pub fn build_http_client(config: &Config) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .user_agent(format!("chat2scira/{}", env!("CARGO_PKG_VERSION")));

    if let Some(url) = &config.proxy_url {
        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| anyhow::anyhow!("invalid proxy url {url}: {e}"))?;
        builder = builder.proxy(proxy);
        tracing::info!("Outbound proxy: {}", url);
    } else {
        // Proxy env vars are already folded into the config; don't let reqwest re-read them.
        builder = builder.no_proxy();
    }

    Ok(builder.build()?)
}

/// Build a JSON error response with the given HTTP status and message: `{"error": msg}`.
pub fn error_response(status: StatusCode, msg: &str) -> Response {
    let body = serde_json::json!({ "error": msg });
    (status, axum::Json(body)).into_response()
}

/// Build a CORS layer from environment variables.
///
/// Environment variables:
/// - CORS_ALLOWED_ORIGINS: "*" or comma-separated origins (e.g., "https://a.com, https://b.com")
///
/// Methods and headers are always permissive; origins default to Any when not configured.
pub fn cors_layer_from_env() -> tower_http::cors::CorsLayer {
    use tower_http::cors::{AllowOrigin, Any, CorsLayer};

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let origins = std::env::var("CORS_ALLOWED_ORIGINS").unwrap_or_default();
    let s = origins.trim();
    if s.is_empty() || s == "*" {
        return layer.allow_origin(Any);
    }

    let vals: Vec<http::HeaderValue> = s
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| http::HeaderValue::from_str(p).ok())
        .collect();
    if vals.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(vals))
    }
}
