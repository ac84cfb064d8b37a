//! Service layer for the confab service
//!
//! Application state wiring and background task management for the
//! production binary: store, dispatch queue, engine, bridge registration,
//! and the health/metrics endpoint.

pub mod health;

pub use health::{HealthServer, HealthServerConfig};

use crate::config::AppConfig;
use crate::dispatch::DispatchQueue;
use crate::engine::Matchmaker;
use crate::gateway::Messenger;
use crate::metrics::MetricsCollector;
use crate::store::MemoryStore;
use crate::utils::current_timestamp;
use anyhow::Result;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Fully wired application state. One instance per process.
pub struct AppState {
    config: AppConfig,
    store: Arc<MemoryStore>,
    metrics: Arc<MetricsCollector>,
    queue: DispatchQueue,
    engine: Arc<Matchmaker>,
    started_at: DateTime<Utc>,
    health_task: Mutex<Option<JoinHandle<()>>>,
    health_server: Arc<HealthServer>,
}

impl AppState {
    /// Wire every component together. The messenger is the only
    /// collaborator injected from outside; everything else is built from
    /// configuration.
    pub fn new(config: AppConfig, messenger: Arc<dyn Messenger>) -> Result<Self> {
        let metrics = Arc::new(MetricsCollector::new()?);
        let store = Arc::new(MemoryStore::with_access_lists(
            config.access.admin_ids.clone(),
            config.access.banned_ids.clone(),
        ));
        let queue = DispatchQueue::start(messenger, config.dispatch_config(), metrics.clone());
        let engine = Matchmaker::new(
            store.clone(),
            queue.clone(),
            config.open_hours(),
            config.matchmaker_settings(),
            metrics.clone(),
        );
        engine.register_bridge();

        let started_at = current_timestamp();
        let health_server = Arc::new(HealthServer::new(
            HealthServerConfig {
                host: config.service.health_host.clone(),
                port: config.service.health_port,
            },
            metrics.clone(),
            store.clone(),
            queue.clone(),
            started_at,
        ));

        Ok(Self {
            config,
            store,
            metrics,
            queue,
            engine,
            started_at,
            health_task: Mutex::new(None),
            health_server,
        })
    }

    /// Start background services (the health endpoint)
    pub fn start(&self) -> Result<()> {
        let server = self.health_server.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("Health server failed: {e:#}");
            }
        });
        if let Ok(mut slot) = self.health_task.lock() {
            *slot = Some(handle);
        }
        info!("Service components started");
        Ok(())
    }

    /// Stop background services and drain the dispatch worker
    pub async fn shutdown(&self) {
        self.health_server.stop();
        self.queue.shutdown().await;
        let handle = self.health_task.lock().ok().and_then(|mut s| s.take());
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("Service components stopped");
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> Arc<Matchmaker> {
        self.engine.clone()
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    pub fn queue(&self) -> &DispatchQueue {
        &self.queue
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
