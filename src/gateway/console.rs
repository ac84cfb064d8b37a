//! Console loopback transport
//!
//! Writes outbound traffic to the log instead of a real platform. Used by
//! the binary for local development and by integration-style test runs
//! that only care about what would have been sent.

use crate::gateway::{MessageHandle, Messenger, SendResult};
use crate::types::{OutboundPayload, UserId};
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;

/// Messenger that logs deliveries and always succeeds
#[derive(Debug, Default)]
pub struct ConsoleMessenger {
    next_message_id: AtomicI64,
}

impl ConsoleMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages delivered so far
    pub fn delivered(&self) -> i64 {
        self.next_message_id.load(Ordering::Relaxed)
    }

    fn describe(payload: &OutboundPayload) -> String {
        match payload {
            OutboundPayload::Text { body, .. } => body.clone(),
            OutboundPayload::TopicMenu { body, topics } => {
                format!("{body} {topics:?}")
            }
            OutboundPayload::JoinPrompt { body, topic, .. } => {
                format!("{body} [join: {topic}]")
            }
            OutboundPayload::Forward {
                origin, message_id, ..
            } => format!("<forward {message_id} from {origin}>"),
            OutboundPayload::Media { kind, file_id, .. } => {
                format!("<{} {file_id}>", kind.as_str())
            }
            OutboundPayload::Contact { first_name, .. } => {
                format!("<contact {first_name}>")
            }
            OutboundPayload::Location {
                latitude,
                longitude,
                ..
            } => format!("<location {latitude},{longitude}>"),
            OutboundPayload::Venue { title, .. } => format!("<venue {title}>"),
        }
    }
}

#[async_trait]
impl Messenger for ConsoleMessenger {
    async fn send(&self, recipient: UserId, payload: &OutboundPayload) -> SendResult {
        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(target: "outbound", "-> {recipient}: {}", Self::describe(payload));
        Ok(MessageHandle { message_id })
    }
}
