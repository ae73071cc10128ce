//! Main application configuration
//!
//! This module defines the primary configuration structures for the ready-room
//! matchmaking service, including environment variable loading and validation.

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
    pub matchmaking: MatchmakingSettings,
    pub token: TokenSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Address to bind the HTTP API to
    pub bind_address: String,
    /// Port for the HTTP API
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Group size at which a pending match forms and the grace countdown starts
    pub min_players: usize,
    /// Group size at which the match starts immediately
    pub max_players: usize,
    /// Grace window to admit a late joiner after the group forms
    pub wait_for_fourth_seconds: u64,
    /// Retry delay when no dedicated server is READY at match start
    pub allocation_retry_seconds: u64,
}

/// Start-token settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenSettings {
    /// Shared secret the start-token signature is keyed with
    pub secret: String,
    /// Token lifetime in seconds
    pub ttl_seconds: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "ready-room".to_string(),
            log_level: "info".to_string(),
            bind_address: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            min_players: 3,
            max_players: 4,
            wait_for_fourth_seconds: 5,
            allocation_retry_seconds: 1,
        }
    }
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            secret: "dev-secret-change-me".to_string(),
            ttl_seconds: 300, // 5 minutes
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(bind) = env::var("BIND_ADDRESS") {
            config.service.bind_address = bind;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            config.service.http_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HTTP_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Matchmaking settings
        if let Ok(min) = env::var("MATCH_MIN_PLAYERS") {
            config.matchmaking.min_players = min
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_MIN_PLAYERS value: {}", min))?;
        }
        if let Ok(max) = env::var("MATCH_MAX_PLAYERS") {
            config.matchmaking.max_players = max
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_MAX_PLAYERS value: {}", max))?;
        }
        if let Ok(wait) = env::var("MATCH_WAIT_FOR_FOURTH_SECONDS") {
            config.matchmaking.wait_for_fourth_seconds = wait
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_WAIT_FOR_FOURTH_SECONDS value: {}", wait))?;
        }
        if let Ok(retry) = env::var("MATCH_ALLOCATION_RETRY_SECONDS") {
            config.matchmaking.allocation_retry_seconds = retry
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_ALLOCATION_RETRY_SECONDS value: {}", retry))?;
        }

        // Token settings
        if let Ok(secret) = env::var("MATCH_TOKEN_SECRET") {
            config.token.secret = secret;
        }
        if let Ok(ttl) = env::var("MATCH_TOKEN_TTL_SECONDS") {
            config.token.ttl_seconds = ttl
                .parse()
                .map_err(|_| anyhow!("Invalid MATCH_TOKEN_TTL_SECONDS value: {}", ttl))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, applying defaults for absent fields
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the token lifetime as a chrono Duration, floored at one second
    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token.ttl_seconds.max(1) as i64)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate service settings
    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate matchmaking settings
    if config.matchmaking.min_players < 2 {
        return Err(anyhow!("Minimum players must be at least 2"));
    }
    if config.matchmaking.max_players < config.matchmaking.min_players {
        return Err(anyhow!(
            "Maximum players ({}) cannot be below minimum players ({})",
            config.matchmaking.max_players,
            config.matchmaking.min_players
        ));
    }
    if config.matchmaking.wait_for_fourth_seconds == 0 {
        return Err(anyhow!("Grace window must be greater than 0"));
    }
    if config.matchmaking.allocation_retry_seconds == 0 {
        return Err(anyhow!("Allocation retry delay must be greater than 0"));
    }

    // Validate token settings
    if config.token.secret.trim().is_empty() {
        return Err(anyhow!("Token secret cannot be blank"));
    }
    if config.token.ttl_seconds == 0 {
        return Err(anyhow!("Token TTL must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.matchmaking.min_players, 3);
        assert_eq!(config.matchmaking.max_players, 4);
        assert_eq!(config.matchmaking.wait_for_fourth_seconds, 5);
        assert_eq!(config.matchmaking.allocation_retry_seconds, 1);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_max_players_below_min_rejected() {
        let mut config = AppConfig::default();
        config.matchmaking.max_players = 2;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_blank_token_secret_rejected() {
        let mut config = AppConfig::default();
        config.token.secret = "   ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_token_ttl_is_floored_at_one_second() {
        let mut config = AppConfig::default();
        config.token.ttl_seconds = 0;
        assert_eq!(config.token_ttl(), chrono::Duration::seconds(1));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [matchmaking]
            min_players = 2
            max_players = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.matchmaking.min_players, 2);
        assert_eq!(config.matchmaking.max_players, 2);
        assert_eq!(config.service.http_port, 8080);
        assert_eq!(config.token.ttl_seconds, 300);
    }
}
