//! Health check model for the ready-room service

use crate::service::app::AppState;
use crate::types::ServerStatus;
use serde::{Deserialize, Serialize};

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Service version
    pub version: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    /// Tickets waiting in the FIFO queue
    pub queue_depth: usize,
    /// Players in the currently forming match, if any
    pub forming_players: usize,
    /// Tickets created since service start
    pub tickets_created: u64,
    /// Matches started since service start
    pub matches_started: u64,
    /// Players matched since service start
    pub players_matched: u64,
    /// Registered dedicated servers
    pub registered_servers: usize,
    /// Dedicated servers currently READY
    pub ready_servers: usize,
    /// Seconds since service start
    pub uptime_seconds: i64,
}

impl HealthReport {
    /// Build a health report from live engine and registry state.
    ///
    /// With no READY server the service still queues players but cannot
    /// launch matches, which reports as degraded rather than unhealthy.
    pub fn check(state: &AppState) -> Self {
        let engine = state.engine().stats();
        let servers = state.registry().snapshot();
        let ready_servers = servers
            .iter()
            .filter(|record| record.status == ServerStatus::Ready)
            .count();

        let status = if !state.is_running() {
            HealthStatus::Unhealthy
        } else if ready_servers == 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport {
            status,
            service: state.config().service.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            stats: ServiceStats {
                queue_depth: engine.queue_depth,
                forming_players: engine.forming_players,
                tickets_created: engine.tickets_created,
                matches_started: engine.matches_started,
                players_matched: engine.players_matched,
                registered_servers: servers.len(),
                ready_servers,
                uptime_seconds: state.uptime_seconds(),
            },
        }
    }
}
