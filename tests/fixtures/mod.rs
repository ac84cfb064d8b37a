//! Shared fixtures for integration tests

use async_trait::async_trait;
use confab::dispatch::{DispatchConfig, DispatchQueue};
use confab::engine::{Matchmaker, MatchmakerSettings};
use confab::gateway::{MessageHandle, Messenger, SendError, SendResult};
use confab::hours::OpenHours;
use confab::metrics::MetricsCollector;
use confab::store::MemoryStore;
use confab::types::{OutboundPayload, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Messenger that records every delivery attempt and can be told to fail
/// selected recipients with a configured error phrase.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(UserId, OutboundPayload, Instant)>>,
    failing: Mutex<HashMap<UserId, String>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_user(&self, user: UserId, phrase: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(user, phrase.to_string());
    }

    pub fn sent(&self) -> Vec<(UserId, OutboundPayload, Instant)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    /// Text-ish bodies attempted for one user, in send order
    pub fn bodies_for(&self, user: UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(r, _, _)| *r == user)
            .filter_map(|(_, p, _)| match p {
                OutboundPayload::Text { body, .. } => Some(body),
                OutboundPayload::TopicMenu { body, .. } => Some(body),
                OutboundPayload::JoinPrompt { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, recipient: UserId, payload: &OutboundPayload) -> SendResult {
        self.sent
            .lock()
            .unwrap()
            .push((recipient, payload.clone(), Instant::now()));
        match self.failing.lock().unwrap().get(&recipient) {
            Some(phrase) => Err(SendError::new(phrase.clone())),
            None => Ok(MessageHandle { message_id: 1 }),
        }
    }
}

/// A complete system over an in-memory store: fast pacing, the open-hours
/// gate disabled, and the failure bridge wired up.
pub fn create_test_system(
    admins: Vec<UserId>,
    banned: Vec<UserId>,
) -> (
    Arc<Matchmaker>,
    Arc<RecordingMessenger>,
    Arc<MemoryStore>,
    DispatchQueue,
) {
    let store = Arc::new(MemoryStore::with_access_lists(admins, banned));
    let messenger = Arc::new(RecordingMessenger::new());
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let queue = DispatchQueue::start(
        messenger.clone(),
        DispatchConfig {
            pacing_interval: Duration::from_millis(2),
            ..DispatchConfig::default()
        },
        metrics.clone(),
    );
    let engine = Matchmaker::new(
        store.clone(),
        queue.clone(),
        OpenHours::disabled(),
        MatchmakerSettings::default(),
        metrics,
    );
    engine.register_bridge();
    (engine, messenger, store, queue)
}

/// Poll until the condition holds or a generous timeout elapses
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
