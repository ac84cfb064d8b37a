//! Configuration management for the confab service
//!
//! This module handles configuration loading from a TOML file and
//! environment variables, validation, and defaults.

pub mod app;

// Re-export commonly used types
pub use app::{
    validate_config, AccessSettings, AppConfig, DispatchSettings, PairingSettings,
    ServiceSettings,
};
