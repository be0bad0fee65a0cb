use anyhow::{anyhow, Result};
use axum::Router;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::{get_metrics, Metrics};
use crate::observability::routes::MetricsState;
use crate::provider::TokenProvider;
use crate::server::token_route::TokenState;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub token_state: TokenState,
}

impl AppState {
    pub fn new(metrics: &Metrics, provider: Option<TokenProvider>) -> Self {
        Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            token_state: TokenState::new(provider),
        }
    }
}

/// Token and metrics routes for the configured paths.
pub async fn app(settings_config: &SettingsConfig, provider: Option<TokenProvider>) -> Router {
    let metrics = get_metrics().await;
    let state = AppState::new(metrics, provider);

    Router::new()
        .merge(state.metrics_state.router(&settings_config.metrics))
        .merge(state.token_state.router(&settings_config.server))
        .with_state(state)
}

/// Runs one Axum server until ctrl-c.
pub async fn start(settings_config: &SettingsConfig, provider: Option<TokenProvider>) -> Result<()> {
    let metrics = get_metrics().await;
    let app = app(settings_config, provider).await;

    if !app.has_routes() {
        info!("no routes configured, http server not started");
        return Ok(());
    }

    let addr = format!("{}:{}", settings_config.server.host, settings_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow!("cannot bind '{}': {}", addr, e))?;
    info!("listening on {}", addr);

    metrics.up.set(1);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    metrics.up.set(0);

    served.map_err(|e| anyhow!("http server failed: {}", e))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
