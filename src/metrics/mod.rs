//! Metrics collection using Prometheus
//!
//! Counters and gauges for the dispatch pipeline and session transitions,
//! exposed over the health server's `/metrics` endpoint.

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Main metrics collector for the pairing chat service
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    dispatch_metrics: DispatchMetrics,
    session_metrics: SessionMetrics,
}

/// Dispatch pipeline metrics
#[derive(Clone)]
pub struct DispatchMetrics {
    /// Actions sent, labeled by result (ok / transient / permanent)
    pub actions_sent_total: IntCounterVec,
    /// Batches enqueued, labeled by tier
    pub batches_enqueued_total: IntCounterVec,
    /// Batches currently waiting or mid-dispatch
    pub queue_depth: IntGauge,
}

/// Session/matchmaking metrics
#[derive(Clone)]
pub struct SessionMetrics {
    /// Completed pairings
    pub matches_total: IntCounter,
    /// Invitations posted (including idempotent re-posts)
    pub invitations_posted_total: IntCounter,
    /// Lobby joins
    pub lobby_joins_total: IntCounter,
    /// Forced teardowns via the failure bridge
    pub teardowns_total: IntCounter,
    /// Admin announcements sent out
    pub broadcasts_total: IntCounter,
}

impl DispatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let actions_sent_total = IntCounterVec::new(
            Opts::new("confab_actions_sent_total", "Outbound actions by result"),
            &["result"],
        )?;
        let batches_enqueued_total = IntCounterVec::new(
            Opts::new("confab_batches_enqueued_total", "Enqueued batches by tier"),
            &["tier"],
        )?;
        let queue_depth = IntGauge::new("confab_queue_depth", "Batches waiting or mid-dispatch")?;

        registry.register(Box::new(actions_sent_total.clone()))?;
        registry.register(Box::new(batches_enqueued_total.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;

        Ok(Self {
            actions_sent_total,
            batches_enqueued_total,
            queue_depth,
        })
    }
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let matches_total = IntCounter::new("confab_matches_total", "Completed pairings")?;
        let invitations_posted_total =
            IntCounter::new("confab_invitations_posted_total", "Invitations posted")?;
        let lobby_joins_total = IntCounter::new("confab_lobby_joins_total", "Lobby joins")?;
        let teardowns_total = IntCounter::new(
            "confab_teardowns_total",
            "Forced session teardowns after permanent delivery failures",
        )?;
        let broadcasts_total =
            IntCounter::new("confab_broadcasts_total", "Admin announcements")?;

        registry.register(Box::new(matches_total.clone()))?;
        registry.register(Box::new(invitations_posted_total.clone()))?;
        registry.register(Box::new(lobby_joins_total.clone()))?;
        registry.register(Box::new(teardowns_total.clone()))?;
        registry.register(Box::new(broadcasts_total.clone()))?;

        Ok(Self {
            matches_total,
            invitations_posted_total,
            lobby_joins_total,
            teardowns_total,
            broadcasts_total,
        })
    }
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Create a new metrics collector with a custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let dispatch_metrics = DispatchMetrics::new(&registry)?;
        let session_metrics = SessionMetrics::new(&registry)?;

        Ok(Self {
            registry,
            dispatch_metrics,
            session_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Dispatch pipeline metrics
    pub fn dispatch(&self) -> &DispatchMetrics {
        &self.dispatch_metrics
    }

    /// Session/matchmaking metrics
    pub fn session(&self) -> &SessionMetrics {
        &self.session_metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_registers_metric_families() {
        let collector = MetricsCollector::new().unwrap();
        collector.session().matches_total.inc();
        collector
            .dispatch()
            .actions_sent_total
            .with_label_values(&["ok"])
            .inc();

        let families = collector.registry().gather();
        let names: Vec<String> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.iter().any(|n| n == "confab_matches_total"));
        assert!(names.iter().any(|n| n == "confab_actions_sent_total"));
    }

    #[test]
    fn test_two_collectors_do_not_collide() {
        // Each collector owns its registry, so parallel tests can build one each
        let a = MetricsCollector::new().unwrap();
        let b = MetricsCollector::new().unwrap();
        a.session().matches_total.inc();
        assert_eq!(b.session().matches_total.get(), 0);
    }
}
