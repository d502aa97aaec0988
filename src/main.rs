use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use grocy_gateway::config::Config;
use grocy_gateway::dispatch::{Dispatcher, RetryPolicy};
use grocy_gateway::grocy::GrocyClient;
use grocy_gateway::routes::{self, AppState};
use grocy_gateway::session::SessionManager;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (for log level)
    let config = Config::load()?;
    config.validate()?;

    // Initialize logging with the configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    tracing::info!("🚀 Grocy Gateway starting...");
    tracing::info!(
        "Server configured: {}:{}",
        config.server_host,
        config.server_port
    );

    // Session manager owns the single control channel to Home Assistant
    let session = Arc::new(SessionManager::from_config(&config));

    // Probe the ingress session once at startup
    match session.ensure_valid_credential().await {
        Ok(credential) => {
            tracing::info!(
                "✅ Ingress session established (issued {})",
                credential.issued_at().to_rfc3339()
            );
        }
        Err(e) => {
            tracing::error!("❌ Could not establish an ingress session: {e}");
            tracing::warn!("Server will start but upstream requests will fail until the ingress endpoint is reachable");
        }
    }

    let dispatcher = Arc::new(Dispatcher::new(
        session.clone(),
        &config.grocy_api_url,
        config.grocy_api_key.clone(),
        Duration::from_secs(config.http_request_timeout),
        RetryPolicy {
            max_attempts: config.http_max_attempts,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        },
    )?);
    tracing::info!("✅ Upstream dispatcher initialized");

    let client = Arc::new(GrocyClient::new(dispatcher));
    let app = routes::router(AppState { client });

    // Bind to configured host and port
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server shutdown complete");

    Ok(())
}

/// Handle graceful shutdown signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
