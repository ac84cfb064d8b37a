//! Outbound dispatch queue
//!
//! A concurrent, priority-ordered, rate-limited delivery pipeline. Batches
//! of outbound actions enter one of three tiers; a single worker paces
//! dispatch across all tiers and batches, individual sends run on their own
//! tasks, and per-action failures are classified so permanent ones can feed
//! back into session state.

pub mod classify;
pub mod queue;

pub use classify::{FailureClass, BLOCKED_PHRASE, DEACTIVATED_PHRASE};
pub use queue::{DispatchConfig, DispatchQueue};

use crate::gateway::SendResult;
use crate::types::{BatchId, UserId};
use async_trait::async_trait;

/// Result of one action within a batch. The recipient is carried
/// explicitly; it is never recovered by introspecting the payload.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    pub recipient: UserId,
    pub result: SendResult,
}

/// Everything a batch's completion callback learns, once, after every
/// action in the batch has completed.
#[derive(Debug)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub outcomes: Vec<ActionOutcome>,
}

impl BatchResult {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.len() - self.success_count()
    }

    /// First failed outcome, if any
    pub fn first_failure(&self) -> Option<&ActionOutcome> {
        self.outcomes.iter().find(|o| o.result.is_err())
    }
}

/// Invoked exactly once per batch, on whichever task completes the last
/// outstanding action. Must not assume exclusive access to shared state.
pub type CompletionCallback = Box<dyn FnOnce(BatchResult) + Send + 'static>;

/// Bridge from permanent delivery failures back into session state.
/// Implementations must be idempotent and safe to invoke concurrently
/// with in-flight transitions for the same user.
#[async_trait]
pub trait PermanentFailureHandler: Send + Sync {
    async fn on_permanent_failure(&self, user: UserId);
}
