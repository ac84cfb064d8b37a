//! Priority dispatch queue implementation
//!
//! Three FIFO tiers, one dedicated worker. The worker always services the
//! head of the highest non-empty tier and imposes one global pacing delay
//! between consecutive dispatches, shared across all tiers and batches.
//! Individual network calls run on their own tasks so a slow send never
//! stalls the pacing clock. Strict priority means a starved Low tier is an
//! accepted trade-off, bounded only by the higher tiers draining.

use crate::dispatch::classify::{classify, default_permanent_phrases, FailureClass};
use crate::dispatch::{ActionOutcome, BatchResult, CompletionCallback, PermanentFailureHandler};
use crate::error::ConfabError;
use crate::gateway::Messenger;
use crate::metrics::MetricsCollector;
use crate::types::{BatchId, OutboundAction, Priority};
use crate::utils::generate_batch_id;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Dispatch queue configuration
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Minimum spacing between the start of any two consecutive
    /// dispatches, across all tiers and batches
    pub pacing_interval: Duration,
    /// Error phrases classified as permanent recipient failures
    pub permanent_phrases: Vec<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_interval: Duration::from_millis(35),
            permanent_phrases: default_permanent_phrases(),
        }
    }
}

/// Shared completion state of one batch
struct BatchShared {
    batch_id: BatchId,
    total: usize,
    outcomes: Mutex<Vec<Option<ActionOutcome>>>,
    completed: AtomicUsize,
    callback: Mutex<Option<CompletionCallback>>,
}

impl BatchShared {
    fn new(batch_id: BatchId, total: usize, callback: Option<CompletionCallback>) -> Self {
        Self {
            batch_id,
            total,
            outcomes: Mutex::new(vec![None; total]),
            completed: AtomicUsize::new(0),
            callback: Mutex::new(callback),
        }
    }

    /// Record one action's outcome; fires the callback exactly once when
    /// the last outstanding action completes.
    fn complete(&self, index: usize, outcome: ActionOutcome) {
        {
            let mut slots = lock_recovering(&self.outcomes);
            slots[index] = Some(outcome);
        }
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        if done == self.total {
            let callback = lock_recovering(&self.callback).take();
            if let Some(callback) = callback {
                let outcomes: Vec<ActionOutcome> = lock_recovering(&self.outcomes)
                    .drain(..)
                    .flatten()
                    .collect();
                callback(BatchResult {
                    batch_id: self.batch_id,
                    outcomes,
                });
            }
        }
    }
}

/// One enqueued batch; `cursor` tracks how many actions have been
/// dispatched (not completed)
struct Batch {
    actions: Vec<OutboundAction>,
    cursor: usize,
    shared: Arc<BatchShared>,
}

struct QueueInner {
    tiers: Mutex<[VecDeque<Batch>; 3]>,
    wakeup: Notify,
    messenger: Arc<dyn Messenger>,
    config: DispatchConfig,
    failure_handler: RwLock<Option<Weak<dyn PermanentFailureHandler>>>,
    metrics: Arc<MetricsCollector>,
    shutdown: AtomicBool,
}

/// A poisoned guard still holds consistent tier data (panics cannot happen
/// mid-mutation here); recover the inner value rather than wedging the
/// queue.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl QueueInner {
    /// Pick the next action to dispatch: head batch of the highest
    /// non-empty tier, advancing that batch's cursor. A batch leaves its
    /// tier once fully dispatched.
    fn next_dispatch(&self) -> Option<(OutboundAction, Arc<BatchShared>, usize)> {
        let mut tiers = lock_recovering(&self.tiers);
        for tier in tiers.iter_mut() {
            if let Some(batch) = tier.front_mut() {
                let index = batch.cursor;
                let action = batch.actions[index].clone();
                let shared = Arc::clone(&batch.shared);
                batch.cursor += 1;
                if batch.cursor == batch.actions.len() {
                    tier.pop_front();
                }
                let depth: usize = tiers.iter().map(|t| t.len()).sum();
                self.metrics.dispatch().queue_depth.set(depth as i64);
                return Some((action, shared, index));
            }
        }
        None
    }

    /// Run one send on its own task so the worker only ever blocks on the
    /// pacing timer.
    fn spawn_send(
        self: &Arc<Self>,
        action: OutboundAction,
        shared: Arc<BatchShared>,
        index: usize,
    ) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner
                .messenger
                .send(action.recipient, &action.payload)
                .await;

            match &result {
                Ok(_) => {
                    inner
                        .metrics
                        .dispatch()
                        .actions_sent_total
                        .with_label_values(&["ok"])
                        .inc();
                }
                Err(err) => {
                    let class = classify(err, &inner.config.permanent_phrases);
                    inner
                        .metrics
                        .dispatch()
                        .actions_sent_total
                        .with_label_values(&[class.as_str()])
                        .inc();
                    match class {
                        FailureClass::Permanent => {
                            warn!(
                                "{}",
                                ConfabError::PermanentRecipient {
                                    user: action.recipient,
                                    message: err.to_string(),
                                }
                            );
                            inner.invoke_failure_bridge(action.recipient);
                        }
                        FailureClass::Transient => {
                            warn!(
                                "{} (recipient {})",
                                ConfabError::TransientDelivery {
                                    message: err.to_string(),
                                },
                                action.recipient
                            );
                        }
                    }
                }
            }

            shared.complete(
                index,
                ActionOutcome {
                    recipient: action.recipient,
                    result,
                },
            );
        });
    }

    /// Hand a permanently unreachable recipient to the bridge, off the
    /// send task's critical path.
    fn invoke_failure_bridge(&self, user: crate::types::UserId) {
        let handler = self
            .failure_handler
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade));
        match handler {
            Some(handler) => {
                tokio::spawn(async move {
                    handler.on_permanent_failure(user).await;
                });
            }
            None => {
                debug!("No failure handler registered; skipping teardown for user {user}");
            }
        }
    }

    async fn run(self: Arc<Self>) {
        info!(
            "Dispatch worker started (pacing {:?})",
            self.config.pacing_interval
        );
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            match self.next_dispatch() {
                Some((action, shared, index)) => {
                    self.spawn_send(action, shared, index);
                    sleep(self.config.pacing_interval).await;
                }
                None => self.wakeup.notified().await,
            }
        }
        info!("Dispatch worker stopped");
    }
}

/// Handle to the dispatch pipeline. Cheap to clone; one instance per
/// process, passed explicitly to whoever needs to send.
#[derive(Clone)]
pub struct DispatchQueue {
    inner: Arc<QueueInner>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DispatchQueue {
    /// Start the queue and its dedicated worker task
    pub fn start(
        messenger: Arc<dyn Messenger>,
        config: DispatchConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let inner = Arc::new(QueueInner {
            tiers: Mutex::new([VecDeque::new(), VecDeque::new(), VecDeque::new()]),
            wakeup: Notify::new(),
            messenger,
            config,
            failure_handler: RwLock::new(None),
            metrics,
            shutdown: AtomicBool::new(false),
        });
        let worker = tokio::spawn(Arc::clone(&inner).run());
        Self {
            inner,
            worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Register the failure-feedback bridge. Held weakly so the queue does
    /// not keep the engine alive.
    pub fn set_failure_handler(&self, handler: Weak<dyn PermanentFailureHandler>) {
        if let Ok(mut slot) = self.inner.failure_handler.write() {
            *slot = Some(handler);
        } else {
            error!("Failure handler slot poisoned; bridge not registered");
        }
    }

    /// Enqueue an ordered batch at a priority tier. The callback fires
    /// exactly once, after every action has completed. An empty batch
    /// completes immediately.
    pub fn enqueue(
        &self,
        priority: Priority,
        actions: Vec<OutboundAction>,
        callback: Option<CompletionCallback>,
    ) -> BatchId {
        let batch_id = generate_batch_id();

        if actions.is_empty() {
            if let Some(callback) = callback {
                callback(BatchResult {
                    batch_id,
                    outcomes: Vec::new(),
                });
            }
            return batch_id;
        }

        self.inner
            .metrics
            .dispatch()
            .batches_enqueued_total
            .with_label_values(&[priority.as_str()])
            .inc();

        let shared = Arc::new(BatchShared::new(batch_id, actions.len(), callback));
        let batch = Batch {
            actions,
            cursor: 0,
            shared,
        };
        {
            let mut tiers = lock_recovering(&self.inner.tiers);
            tiers[priority.index()].push_back(batch);
            let depth: usize = tiers.iter().map(|t| t.len()).sum();
            self.inner.metrics.dispatch().queue_depth.set(depth as i64);
        }
        self.inner.wakeup.notify_one();
        batch_id
    }

    /// Number of batches currently waiting or mid-dispatch
    pub fn depth(&self) -> usize {
        lock_recovering(&self.inner.tiers)
            .iter()
            .map(|t| t.len())
            .sum()
    }

    /// Stop the worker. Undispatched batches are dropped; in-flight sends
    /// finish on their own tasks.
    pub async fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.wakeup.notify_one();
        let handle = lock_recovering(&self.worker).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{MessageHandle, SendError, SendResult};
    use crate::types::{OutboundPayload, UserId};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use tokio::sync::oneshot;

    /// Messenger that records each send's start time and payload
    #[derive(Default)]
    struct RecordingMessenger {
        sends: Mutex<Vec<(UserId, String, Instant)>>,
        fail_with: Mutex<Option<String>>,
    }

    impl RecordingMessenger {
        fn sends(&self) -> Vec<(UserId, String, Instant)> {
            self.sends.lock().unwrap().clone()
        }

        fn fail_all_with(&self, message: &str) {
            *self.fail_with.lock().unwrap() = Some(message.to_string());
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send(&self, recipient: UserId, payload: &OutboundPayload) -> SendResult {
            let body = match payload {
                OutboundPayload::Text { body, .. } => body.clone(),
                other => format!("{other:?}"),
            };
            self.sends
                .lock()
                .unwrap()
                .push((recipient, body, Instant::now()));
            match self.fail_with.lock().unwrap().clone() {
                Some(message) => Err(SendError::new(message)),
                None => Ok(MessageHandle { message_id: 1 }),
            }
        }
    }

    struct CountingHandler {
        invocations: AtomicUsize,
    }

    #[async_trait]
    impl PermanentFailureHandler for CountingHandler {
        async fn on_permanent_failure(&self, _user: UserId) {
            self.invocations.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn test_queue(pacing_ms: u64) -> (DispatchQueue, Arc<RecordingMessenger>) {
        let messenger = Arc::new(RecordingMessenger::default());
        let config = DispatchConfig {
            pacing_interval: Duration::from_millis(pacing_ms),
            ..DispatchConfig::default()
        };
        let metrics = Arc::new(MetricsCollector::new().unwrap());
        let queue = DispatchQueue::start(messenger.clone(), config, metrics);
        (queue, messenger)
    }

    fn text_batch(tag: &str, recipients: &[UserId]) -> Vec<OutboundAction> {
        recipients
            .iter()
            .map(|r| OutboundAction::new(*r, OutboundPayload::text(format!("{tag}-{r}"))))
            .collect()
    }

    async fn wait_for_sends(messenger: &RecordingMessenger, count: usize) {
        for _ in 0..200 {
            if messenger.sends().len() >= count {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "timed out waiting for {count} sends, saw {}",
            messenger.sends().len()
        );
    }

    #[tokio::test]
    async fn test_priority_ordering_is_strict() {
        let (queue, messenger) = test_queue(10);

        queue.enqueue(Priority::High, text_batch("high", &[1, 2]), None);
        queue.enqueue(Priority::Normal, text_batch("normal", &[3, 4]), None);
        queue.enqueue(Priority::Low, text_batch("low", &[5, 6]), None);

        wait_for_sends(&messenger, 6).await;
        let tags: Vec<String> = messenger
            .sends()
            .iter()
            .map(|(_, body, _)| body.split('-').next().unwrap().to_string())
            .collect();
        assert_eq!(tags, vec!["high", "high", "normal", "normal", "low", "low"]);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_high_batch_preempts_low() {
        let (queue, messenger) = test_queue(30);

        queue.enqueue(Priority::Low, text_batch("low", &[1, 2, 3, 4]), None);
        // Let the first low action dispatch, then inject a high batch
        wait_for_sends(&messenger, 1).await;
        queue.enqueue(Priority::High, text_batch("high", &[9]), None);

        wait_for_sends(&messenger, 5).await;
        let tags: Vec<String> = messenger
            .sends()
            .iter()
            .map(|(_, body, _)| body.split('-').next().unwrap().to_string())
            .collect();
        // The high action lands somewhere before the last low action
        let high_pos = tags.iter().position(|t| t == "high").unwrap();
        assert!(high_pos < 4, "high action was not preferred: {tags:?}");
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_pacing_lower_bound() {
        let pacing = Duration::from_millis(50);
        let (queue, messenger) = test_queue(50);

        queue.enqueue(Priority::Normal, text_batch("msg", &[1, 2, 3, 4]), None);
        wait_for_sends(&messenger, 4).await;

        let mut starts: Vec<Instant> = messenger.sends().iter().map(|(_, _, t)| *t).collect();
        starts.sort();
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            // Small slack for task scheduling jitter on the recording side
            assert!(
                gap >= pacing - Duration::from_millis(5),
                "dispatch gap {gap:?} below pacing {pacing:?}"
            );
        }
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_callback_fires_exactly_once_with_all_outcomes() {
        let (queue, messenger) = test_queue(5);
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = oneshot::channel();

        let calls_in_cb = calls.clone();
        let mut tx = Some(tx);
        queue.enqueue(
            Priority::Normal,
            text_batch("msg", &[1, 2, 3]),
            Some(Box::new(move |result: BatchResult| {
                calls_in_cb.fetch_add(1, Ordering::SeqCst);
                if let Some(tx) = tx.take() {
                    let _ = tx.send(result);
                }
            })),
        );

        let result = rx.await.unwrap();
        assert_eq!(result.outcomes.len(), 3);
        assert_eq!(result.success_count(), 3);
        assert_eq!(result.failure_count(), 0);
        // Give any erroneous double-invocation a chance to happen
        sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let _ = messenger;
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let (queue, _messenger) = test_queue(5);
        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        queue.enqueue(
            Priority::High,
            Vec::new(),
            Some(Box::new(move |result: BatchResult| {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(result.outcomes.len());
                }
            })),
        );
        assert_eq!(rx.await.unwrap(), 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_transient_errors_surface_in_callback_without_bridge() {
        let (queue, messenger) = test_queue(5);
        messenger.fail_all_with("Too Many Requests: retry after 30");

        let handler = Arc::new(CountingHandler {
            invocations: AtomicUsize::new(0),
        });
        let handler_dyn: Arc<dyn PermanentFailureHandler> = handler.clone();
        queue.set_failure_handler(Arc::downgrade(&handler_dyn));

        let (tx, rx) = oneshot::channel();
        let mut tx = Some(tx);
        queue.enqueue(
            Priority::Normal,
            text_batch("msg", &[1, 2]),
            Some(Box::new(move |result: BatchResult| {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(result.failure_count());
                }
            })),
        );

        assert_eq!(rx.await.unwrap(), 2);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(handler.invocations.load(Ordering::SeqCst), 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_permanent_error_invokes_bridge() {
        let (queue, messenger) = test_queue(5);
        messenger.fail_all_with("Forbidden: bot was blocked by the user");

        let handler = Arc::new(CountingHandler {
            invocations: AtomicUsize::new(0),
        });
        let handler_dyn: Arc<dyn PermanentFailureHandler> = handler.clone();
        queue.set_failure_handler(Arc::downgrade(&handler_dyn));

        queue.enqueue(Priority::High, text_batch("msg", &[7]), None);

        for _ in 0..100 {
            if handler.invocations.load(Ordering::SeqCst) == 1 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handler.invocations.load(Ordering::SeqCst), 1);
        queue.shutdown().await;
    }
}
