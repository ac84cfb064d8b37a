//! Messaging-platform seam
//!
//! The wire protocol and its client library live behind the [`Messenger`]
//! trait; the core only sees opaque send errors and message handles.

pub mod console;
pub mod relay;

pub use console::ConsoleMessenger;

use crate::types::{OutboundPayload, UserId};
use async_trait::async_trait;

/// Handle of a delivered message, as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHandle {
    pub message_id: i64,
}

/// Opaque delivery error reported by the platform client. The dispatch
/// queue pattern-matches the message against known permanent-failure
/// phrases; everything else is transient.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct SendError {
    pub message: String,
}

impl SendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of one send attempt
pub type SendResult = std::result::Result<MessageHandle, SendError>;

/// Client for the messaging platform
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver one payload to one recipient
    async fn send(&self, recipient: UserId, payload: &OutboundPayload) -> SendResult;
}
