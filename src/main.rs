use chat2scira::config::Config;
use chat2scira::server::build_router;
use chat2scira::util::{init_tracing, AppState};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return Err(e);
        }
    };

    tracing::info!(
        "Serving {} models with {} identities (retry: {}, chat delete: {})",
        config.models.len(),
        config.identities.len(),
        config.retry,
        config.cleanup_enabled
    );
    if config.api_key.is_empty() {
        tracing::warn!("APIKEY is not set; inbound requests are not authenticated");
    }

    let addr = config.bind_addr();
    let state = AppState::from_config(config)?;
    let app = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("chat2scira listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
