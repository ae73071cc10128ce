//! Dedicated game-server registry
//!
//! Tracks registered dedicated server processes and hands READY instances to
//! the matchmaking engine one at a time. All mutations go through the registry
//! lock, so two concurrent allocations can never claim the same server.

use crate::error::{MatchmakingError, Result};
use crate::types::{ServerId, ServerRecord, ServerStatus};
use crate::utils::{current_timestamp, mask};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Registration payload for `register_or_update`.
///
/// Unset fields keep whatever value the record already holds.
#[derive(Debug, Clone, Default)]
pub struct ServerRegistration {
    pub public_address: Option<String>,
    pub internal_address: Option<String>,
    pub game_port: Option<u16>,
    pub query_port: Option<u16>,
    pub status: Option<ServerStatus>,
}

/// Allocation seam between the matchmaking engine and the server pool
pub trait ServerAllocator: Send + Sync {
    /// Atomically claim the READY server that has waited the longest,
    /// flipping it to BUSY.
    fn allocate_ready_server(&self) -> Option<ServerRecord>;

    /// Look up a server without mutating it.
    fn find(&self, server_id: &str) -> Option<ServerRecord>;
}

/// In-memory registry of dedicated game servers
#[derive(Debug, Default)]
pub struct DedicatedServerRegistry {
    servers: Mutex<HashMap<ServerId, ServerRecord>>,
}

impl DedicatedServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ServerId, ServerRecord>> {
        self.servers.lock().expect("server registry lock poisoned")
    }

    /// Upsert a server record. Blank or absent fields retain their previous
    /// values; an absent status defaults to REGISTERED for new entries and is
    /// preserved for updates.
    pub fn register_or_update(
        &self,
        server_id: &str,
        registration: ServerRegistration,
    ) -> Result<ServerRecord> {
        let server_id = server_id.trim();
        if server_id.is_empty() {
            return Err(MatchmakingError::InvalidRegistration {
                reason: "server id is required".to_string(),
            }
            .into());
        }

        let mut servers = self.lock();
        let existing = servers.get(server_id).cloned();

        let status = registration.status.unwrap_or_else(|| {
            existing
                .as_ref()
                .map(|record| record.status)
                .unwrap_or(ServerStatus::Registered)
        });

        let record = ServerRecord {
            server_id: server_id.to_string(),
            public_address: resolve_address(
                registration.public_address,
                existing.as_ref().and_then(|r| r.public_address.clone()),
            ),
            internal_address: resolve_address(
                registration.internal_address,
                existing.as_ref().and_then(|r| r.internal_address.clone()),
            ),
            game_port: resolve_port(
                registration.game_port,
                existing.as_ref().and_then(|r| r.game_port),
            ),
            query_port: resolve_port(
                registration.query_port,
                existing.as_ref().and_then(|r| r.query_port),
            ),
            status,
            last_updated: current_timestamp(),
        };

        info!(
            "Registered dedicated server {} status={} game_port={:?}",
            mask(server_id),
            record.status,
            record.game_port
        );
        servers.insert(server_id.to_string(), record.clone());
        Ok(record)
    }

    /// Overwrite a server's status from an external report. Returns `None`
    /// for unknown server ids.
    pub fn update_status(&self, server_id: &str, status: ServerStatus) -> Option<ServerRecord> {
        let server_id = server_id.trim();
        if server_id.is_empty() {
            return None;
        }

        let mut servers = self.lock();
        let record = servers.get_mut(server_id)?;
        record.status = status;
        record.last_updated = current_timestamp();
        info!(
            "Dedicated server {} reported status {}",
            mask(server_id),
            status
        );
        Some(record.clone())
    }

    /// Snapshot of every registered server, for health reporting.
    pub fn snapshot(&self) -> Vec<ServerRecord> {
        self.lock().values().cloned().collect()
    }
}

impl ServerAllocator for DedicatedServerRegistry {
    fn allocate_ready_server(&self) -> Option<ServerRecord> {
        let mut servers = self.lock();

        let server_id = servers
            .values()
            .filter(|record| record.status == ServerStatus::Ready)
            .min_by_key(|record| record.last_updated)
            .map(|record| record.server_id.clone())?;

        let record = servers.get_mut(&server_id)?;
        record.status = ServerStatus::Busy;
        record.last_updated = current_timestamp();
        info!("Allocated dedicated server {}", mask(&server_id));
        Some(record.clone())
    }

    fn find(&self, server_id: &str) -> Option<ServerRecord> {
        let server_id = server_id.trim();
        if server_id.is_empty() {
            return None;
        }
        debug!("Looking up dedicated server {}", mask(server_id));
        self.lock().get(server_id).cloned()
    }
}

fn resolve_address(candidate: Option<String>, fallback: Option<String>) -> Option<String> {
    match candidate.map(|value| value.trim().to_string()) {
        Some(value) if !value.is_empty() => Some(value),
        _ => fallback,
    }
}

fn resolve_port(candidate: Option<u16>, fallback: Option<u16>) -> Option<u16> {
    candidate.filter(|port| *port > 0).or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn register_ready(registry: &DedicatedServerRegistry, server_id: &str) -> ServerRecord {
        registry
            .register_or_update(
                server_id,
                ServerRegistration {
                    public_address: Some(format!("{}.example.com", server_id)),
                    internal_address: Some("10.0.0.1".to_string()),
                    game_port: Some(7777),
                    query_port: Some(27015),
                    status: Some(ServerStatus::Ready),
                },
            )
            .unwrap()
    }

    #[test]
    fn test_blank_server_id_is_rejected() {
        let registry = DedicatedServerRegistry::new();
        assert!(registry
            .register_or_update("  ", ServerRegistration::default())
            .is_err());
    }

    #[test]
    fn test_new_registration_defaults_to_registered() {
        let registry = DedicatedServerRegistry::new();
        let record = registry
            .register_or_update("ds-1", ServerRegistration::default())
            .unwrap();
        assert_eq!(record.status, ServerStatus::Registered);
        assert_eq!(record.public_address, None);
        assert_eq!(record.game_port, None);
    }

    #[test]
    fn test_update_retains_unset_fields() {
        let registry = DedicatedServerRegistry::new();
        register_ready(&registry, "ds-1");

        // Heartbeat-style update with everything left blank.
        let record = registry
            .register_or_update(
                "ds-1",
                ServerRegistration {
                    public_address: Some("   ".to_string()),
                    internal_address: None,
                    game_port: Some(0),
                    query_port: None,
                    status: None,
                },
            )
            .unwrap();

        assert_eq!(record.public_address.as_deref(), Some("ds-1.example.com"));
        assert_eq!(record.internal_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(record.game_port, Some(7777));
        assert_eq!(record.query_port, Some(27015));
        assert_eq!(record.status, ServerStatus::Ready);
    }

    #[test]
    fn test_update_overrides_set_fields() {
        let registry = DedicatedServerRegistry::new();
        register_ready(&registry, "ds-1");

        let record = registry
            .register_or_update(
                "ds-1",
                ServerRegistration {
                    public_address: Some("new.example.com".to_string()),
                    game_port: Some(8888),
                    status: Some(ServerStatus::Busy),
                    ..ServerRegistration::default()
                },
            )
            .unwrap();

        assert_eq!(record.public_address.as_deref(), Some("new.example.com"));
        assert_eq!(record.game_port, Some(8888));
        assert_eq!(record.status, ServerStatus::Busy);
    }

    #[test]
    fn test_update_status_unknown_server() {
        let registry = DedicatedServerRegistry::new();
        assert!(registry.update_status("ghost", ServerStatus::Ready).is_none());
    }

    #[test]
    fn test_allocate_without_ready_servers() {
        let registry = DedicatedServerRegistry::new();
        assert!(registry.allocate_ready_server().is_none());

        registry
            .register_or_update("ds-1", ServerRegistration::default())
            .unwrap();
        // REGISTERED servers are not yet allocatable.
        assert!(registry.allocate_ready_server().is_none());
    }

    #[test]
    fn test_allocate_prefers_oldest_ready_server() {
        let registry = DedicatedServerRegistry::new();
        register_ready(&registry, "ds-old");
        // Keep the two last_updated stamps strictly ordered.
        thread::sleep(std::time::Duration::from_millis(2));
        register_ready(&registry, "ds-new");

        let first = registry.allocate_ready_server().unwrap();
        assert_eq!(first.server_id, "ds-old");
        assert_eq!(first.status, ServerStatus::Busy);

        let second = registry.allocate_ready_server().unwrap();
        assert_eq!(second.server_id, "ds-new");

        assert!(registry.allocate_ready_server().is_none());
    }

    #[test]
    fn test_status_report_makes_server_allocatable_again() {
        let registry = DedicatedServerRegistry::new();
        register_ready(&registry, "ds-1");

        let allocated = registry.allocate_ready_server().unwrap();
        assert_eq!(allocated.status, ServerStatus::Busy);
        assert!(registry.allocate_ready_server().is_none());

        registry.update_status("ds-1", ServerStatus::Ready).unwrap();
        let again = registry.allocate_ready_server().unwrap();
        assert_eq!(again.server_id, "ds-1");
    }

    #[test]
    fn test_concurrent_allocation_is_exactly_once() {
        let registry = Arc::new(DedicatedServerRegistry::new());
        for i in 0..4 {
            register_ready(&registry, &format!("ds-{}", i));
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.allocate_ready_server())
            })
            .collect();

        let allocated: Vec<ServerRecord> = handles
            .into_iter()
            .filter_map(|handle| handle.join().unwrap())
            .collect();

        // Four servers, eight contenders: exactly four wins, all distinct.
        assert_eq!(allocated.len(), 4);
        let mut ids: Vec<_> = allocated.iter().map(|r| r.server_id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn test_find_trims_and_handles_unknown() {
        let registry = DedicatedServerRegistry::new();
        register_ready(&registry, "ds-1");

        assert!(registry.find(" ds-1 ").is_some());
        assert!(registry.find("ds-2").is_none());
        assert!(registry.find("").is_none());
    }
}
