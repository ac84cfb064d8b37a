//! Health and metrics HTTP endpoints
//!
//! A small Axum server exposing service information, a liveness check with
//! live session counts, and the Prometheus metrics registry.

use crate::dispatch::DispatchQueue;
use crate::metrics::MetricsCollector;
use crate::store::{MemoryStore, SessionStore};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Health server bind configuration
#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Shared state for the health endpoints
#[derive(Clone)]
struct HealthState {
    metrics: Arc<MetricsCollector>,
    store: Arc<MemoryStore>,
    queue: DispatchQueue,
    started_at: DateTime<Utc>,
}

/// HTTP server for monitoring endpoints
pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(
        config: HealthServerConfig,
        metrics: Arc<MetricsCollector>,
        store: Arc<MemoryStore>,
        queue: DispatchQueue,
        started_at: DateTime<Utc>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state: HealthState {
                metrics,
                store,
                queue,
                started_at,
            },
            shutdown_tx,
        }
    }

    /// Bind and serve until a stop signal arrives
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let app = Router::new()
            .route("/", get(root_handler))
            .route("/healthz", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state.clone());

        let listener = TcpListener::bind(addr).await?;
        info!("Health server listening on http://{addr}");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    /// Signal the server to stop
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "confab",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["/healthz", "/metrics"],
    }))
}

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let uptime = (Utc::now() - state.started_at).num_seconds();
    match state.store.active_counts() {
        Ok(counts) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "uptime_seconds": uptime,
                "chatting": counts.chatting,
                "in_lobby": counts.in_lobby,
                "queue_depth": state.queue.depth(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "error": e.to_string(),
            })),
        ),
    }
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = state.metrics.registry().gather();
    let mut buffer = Vec::new();
    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (StatusCode::OK, buffer),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {e}").into_bytes(),
        ),
    }
}
