//! Confab - anonymous pairing chat relay
//!
//! This crate pairs anonymous users for one-on-one or lobby chat behind a
//! messaging front-end, with topic-based matchmaking, a priority-ordered
//! rate-limited dispatch queue, and permanent-failure feedback into
//! session state.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod hours;
pub mod metrics;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{ConfabError, Result};
pub use types::*;

// Re-export key components
pub use dispatch::{DispatchConfig, DispatchQueue, PermanentFailureHandler};
pub use engine::Matchmaker;
pub use gateway::Messenger;
pub use store::{MemoryStore, SessionStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
