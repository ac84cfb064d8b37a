//! Main application configuration
//!
//! Primary configuration structures for the confab service, with TOML file
//! loading, environment variable overrides, and validation.

use crate::dispatch::classify::default_permanent_phrases;
use crate::dispatch::DispatchConfig;
use crate::engine::MatchmakerSettings;
use crate::hours::OpenHours;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub dispatch: DispatchSettings,
    pub pairing: PairingSettings,
    pub hours: OpenHours,
    pub access: AccessSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Bind host for the health/metrics endpoint
    pub health_host: String,
    /// Bind port for the health/metrics endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Dispatch queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    /// Minimum spacing between consecutive dispatches, in milliseconds
    pub pacing_interval_ms: u64,
    /// Error phrases classified as permanent recipient failures
    pub permanent_phrases: Vec<String>,
}

/// Matchmaking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingSettings {
    /// The single shared lobby room id
    pub default_room: i32,
    /// Maximum topics shown by a listing
    pub topic_list_cap: usize,
    /// Secret feeding the daily pseudonym hash
    pub pseudonym_secret: String,
    /// Debug mode: disables the open-hours gate and changes the privacy
    /// note shown on match
    pub debug_mode: bool,
}

/// Static allow/deny lists, immutable at runtime
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    pub admin_ids: Vec<i64>,
    pub banned_ids: Vec<i64>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "confab".to_string(),
            log_level: "info".to_string(),
            health_host: "0.0.0.0".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            pacing_interval_ms: 35,
            permanent_phrases: default_permanent_phrases(),
        }
    }
}

impl Default for PairingSettings {
    fn default() -> Self {
        Self {
            default_room: 0,
            topic_list_cap: 10,
            pseudonym_secret: "confab-dev-secret".to_string(),
            debug_mode: false,
        }
    }
}

fn parse_id_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .map_err(|_| anyhow!("Invalid id in list: {}", s))
        })
        .collect()
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from environment variables with fallback to
    /// defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HEALTH_HOST") {
            config.service.health_host = host;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Dispatch settings
        if let Ok(pacing) = env::var("PACING_INTERVAL_MS") {
            config.dispatch.pacing_interval_ms = pacing
                .parse()
                .map_err(|_| anyhow!("Invalid PACING_INTERVAL_MS value: {}", pacing))?;
        }

        // Pairing settings
        if let Ok(cap) = env::var("TOPIC_LIST_CAP") {
            config.pairing.topic_list_cap = cap
                .parse()
                .map_err(|_| anyhow!("Invalid TOPIC_LIST_CAP value: {}", cap))?;
        }
        if let Ok(secret) = env::var("PSEUDONYM_SECRET") {
            config.pairing.pseudonym_secret = secret;
        }
        if let Ok(debug) = env::var("DEBUG_MODE") {
            config.pairing.debug_mode = debug
                .parse()
                .map_err(|_| anyhow!("Invalid DEBUG_MODE value: {}", debug))?;
        }

        // Open hours
        if let Ok(open) = env::var("OPEN_HOUR") {
            config.hours.open_hour = open
                .parse()
                .map_err(|_| anyhow!("Invalid OPEN_HOUR value: {}", open))?;
        }
        if let Ok(close) = env::var("CLOSE_HOUR") {
            config.hours.close_hour = close
                .parse()
                .map_err(|_| anyhow!("Invalid CLOSE_HOUR value: {}", close))?;
        }
        if let Ok(offset) = env::var("TZ_OFFSET_HOURS") {
            let hours: i64 = offset
                .parse()
                .map_err(|_| anyhow!("Invalid TZ_OFFSET_HOURS value: {}", offset))?;
            config.hours.tz_offset_secs = hours * 3600;
        }

        // Access lists
        if let Ok(admins) = env::var("ADMIN_IDS") {
            config.access.admin_ids = parse_id_list(&admins)?;
        }
        if let Ok(banned) = env::var("BANNED_IDS") {
            config.access.banned_ids = parse_id_list(&banned)?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Build the dispatch queue configuration
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            pacing_interval: Duration::from_millis(self.dispatch.pacing_interval_ms),
            permanent_phrases: self.dispatch.permanent_phrases.clone(),
        }
    }

    /// Build the engine settings
    pub fn matchmaker_settings(&self) -> MatchmakerSettings {
        MatchmakerSettings {
            default_room: self.pairing.default_room,
            topic_list_cap: self.pairing.topic_list_cap,
            pseudonym_secret: self.pairing.pseudonym_secret.clone(),
            debug_mode: self.pairing.debug_mode,
        }
    }

    /// The open-hours gate, with the debug override applied
    pub fn open_hours(&self) -> OpenHours {
        let mut hours = self.hours.clone();
        if self.pairing.debug_mode {
            hours.always_open = true;
        }
        hours
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.dispatch.pacing_interval_ms == 0 {
        return Err(anyhow!("Pacing interval must be greater than 0"));
    }
    if config.dispatch.permanent_phrases.is_empty() {
        return Err(anyhow!("At least one permanent-failure phrase is required"));
    }

    if config.pairing.topic_list_cap == 0 {
        return Err(anyhow!("Topic list cap must be greater than 0"));
    }
    if config.pairing.pseudonym_secret.is_empty() {
        return Err(anyhow!("Pseudonym secret cannot be empty"));
    }

    if config.hours.open_hour > 23 || config.hours.close_hour > 23 {
        return Err(anyhow!("Open hours must be within 0-23"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.pairing.topic_list_cap, 10);
        assert_eq!(config.dispatch.pacing_interval_ms, 35);
        assert_eq!(config.dispatch.permanent_phrases.len(), 2);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_pacing_rejected() {
        let mut config = AppConfig::default();
        config.dispatch.pacing_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_debug_mode_forces_always_open() {
        let mut config = AppConfig::default();
        config.pairing.debug_mode = true;
        assert!(config.open_hours().always_open);
    }

    #[test]
    fn test_parse_id_list() {
        assert_eq!(parse_id_list("1, 2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_id_list("").unwrap(), Vec::<i64>::new());
        assert!(parse_id_list("1,x").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let raw = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&raw).unwrap();
        assert_eq!(parsed.service.name, config.service.name);
        assert_eq!(
            parsed.dispatch.pacing_interval_ms,
            config.dispatch.pacing_interval_ms
        );
    }
}
