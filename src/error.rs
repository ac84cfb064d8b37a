//! Error types for the pairing chat service
//!
//! This module defines all error types using anyhow for consistent error
//! handling throughout the application.

use crate::types::UserId;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific pairing/delivery scenarios
#[derive(Debug, thiserror::Error)]
pub enum ConfabError {
    #[error("session store failure: {message}")]
    Store { message: String },

    #[error("recipient {user} is permanently unreachable: {message}")]
    PermanentRecipient { user: UserId, message: String },

    #[error("delivery failed: {message}")]
    TransientDelivery { message: String },

    #[error("no relay mapping for content kind: {kind}")]
    UnsupportedContent { kind: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("internal service error: {message}")]
    InternalError { message: String },
}

impl From<crate::store::StoreError> for ConfabError {
    fn from(err: crate::store::StoreError) -> Self {
        ConfabError::Store {
            message: err.to_string(),
        }
    }
}
