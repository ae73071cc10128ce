//! Application state wiring
//!
//! Builds the engine, registry, token codec, and authorizer from a validated
//! configuration and exposes them to the HTTP layer.

use crate::config::{validate_config, AppConfig};
use crate::error::Result;
use crate::matchmaker::MatchmakingEngine;
use crate::registry::{DedicatedServerRegistry, ServerAllocator};
use crate::service::health::HealthReport;
use crate::token::{StartAuthorizer, TokenCodec};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared application state
pub struct AppState {
    config: AppConfig,
    engine: MatchmakingEngine,
    registry: Arc<DedicatedServerRegistry>,
    authorizer: StartAuthorizer,
    started_at: DateTime<Utc>,
    running: AtomicBool,
}

impl AppState {
    /// Initialize every component. A blank token secret or otherwise invalid
    /// configuration fails here, before the service accepts traffic.
    pub fn new(config: AppConfig) -> Result<Self> {
        validate_config(&config)?;

        let registry = Arc::new(DedicatedServerRegistry::new());
        let tokens = Arc::new(TokenCodec::new(
            config.token.secret.clone(),
            config.token_ttl(),
        )?);

        let engine = MatchmakingEngine::new(
            config.matchmaking.clone(),
            Arc::clone(&registry) as Arc<dyn ServerAllocator>,
            Arc::clone(&tokens),
        );
        let authorizer = StartAuthorizer::new(
            tokens,
            Arc::clone(&registry) as Arc<dyn ServerAllocator>,
        );

        info!(
            "Initialized matchmaking components (min={}, max={}, grace={}s)",
            config.matchmaking.min_players,
            config.matchmaking.max_players,
            config.matchmaking.wait_for_fourth_seconds
        );

        Ok(Self {
            config,
            engine,
            registry,
            authorizer,
            started_at: current_timestamp(),
            running: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn engine(&self) -> &MatchmakingEngine {
        &self.engine
    }

    pub fn registry(&self) -> &Arc<DedicatedServerRegistry> {
        &self.registry
    }

    pub fn authorizer(&self) -> &StartAuthorizer {
        &self.authorizer
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn uptime_seconds(&self) -> i64 {
        (current_timestamp() - self.started_at).num_seconds()
    }

    /// Produce the current health report.
    pub fn health(&self) -> HealthReport {
        HealthReport::check(self)
    }

    /// Mark the service as stopping and cancel any in-flight countdown.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.engine.shutdown();
        info!("Application state marked stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_from_default_config() {
        let state = AppState::new(AppConfig::default()).unwrap();
        assert!(state.is_running());
        assert_eq!(state.engine().stats().tickets_created, 0);
    }

    #[test]
    fn test_blank_secret_fails_initialization() {
        let mut config = AppConfig::default();
        config.token.secret = " ".to_string();
        assert!(AppState::new(config).is_err());
    }

    #[test]
    fn test_stop_flips_running_flag() {
        let state = AppState::new(AppConfig::default()).unwrap();
        state.stop();
        assert!(!state.is_running());
    }
}
