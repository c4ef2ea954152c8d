//! HTTP server implementation for txlog.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tokio::signal;

use super::config::TxLogServerConfig;
use super::handlers::{
    AppState, handle_healthy, handle_latest, handle_metrics, handle_read, handle_ready,
    handle_submit,
};
use super::metrics::Metrics;
use super::middleware::{MetricsLayer, TracingLayer};
use crate::TxLog;

/// HTTP server for the transaction log.
pub struct TxLogServer {
    log: Arc<TxLog>,
    config: TxLogServerConfig,
    metrics: Arc<Metrics>,
}

impl TxLogServer {
    pub fn new(log: Arc<TxLog>, config: TxLogServerConfig) -> Self {
        Self {
            log,
            config,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Builds the router with all routes and middleware attached.
    pub fn router(&self) -> Router {
        let state = AppState {
            log: self.log.clone(),
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/api/v1/txlog/submit", post(handle_submit))
            .route("/api/v1/txlog/read", get(handle_read))
            .route("/api/v1/txlog/latest", get(handle_latest))
            .route("/metrics", get(handle_metrics))
            .route("/-/healthy", get(handle_healthy))
            .route("/-/ready", get(handle_ready))
            .layer(TracingLayer::new())
            .layer(MetricsLayer::new(self.metrics.clone()))
            .with_state(state)
    }

    /// Run the HTTP server until SIGINT or SIGTERM.
    pub async fn run(self) -> std::io::Result<()> {
        let app = self.router();
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        tracing::info!("Starting txlog HTTP server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Listen for SIGTERM and SIGINT.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
