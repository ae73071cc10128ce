//! Common types used throughout the matchmaking service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Unique identifier for players
pub type PlayerId = String;

/// Unique identifier for matchmaking tickets
pub type TicketId = String;

/// Unique identifier for matches
pub type MatchId = String;

/// Unique identifier for dedicated game servers
pub type ServerId = String;

/// A player as exposed in queue and match rosters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub player_id: PlayerId,
    pub nickname: String,
}

/// Lifecycle state of a matchmaking ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Queued,
    Forming,
    Matched,
    Cancelled,
}

impl TicketStatus {
    /// Terminal tickets never transition again and may be purged.
    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Matched | TicketStatus::Cancelled)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TicketStatus::Queued => write!(f, "QUEUED"),
            TicketStatus::Forming => write!(f, "FORMING"),
            TicketStatus::Matched => write!(f, "MATCHED"),
            TicketStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Availability state of a dedicated game server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Registered,
    Ready,
    Busy,
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerStatus::Registered => write!(f, "REGISTERED"),
            ServerStatus::Ready => write!(f, "READY"),
            ServerStatus::Busy => write!(f, "BUSY"),
        }
    }
}

impl FromStr for ServerStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "REGISTERED" => Ok(ServerStatus::Registered),
            "READY" => Ok(ServerStatus::Ready),
            "BUSY" => Ok(ServerStatus::Busy),
            _ => Err(()),
        }
    }
}

/// One registered dedicated game-server process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRecord {
    pub server_id: ServerId,
    pub public_address: Option<String>,
    pub internal_address: Option<String>,
    pub game_port: Option<u16>,
    pub query_port: Option<u16>,
    pub status: ServerStatus,
    pub last_updated: DateTime<Utc>,
}

/// Resolved match payload stamped on every member ticket once a match starts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    pub match_id: MatchId,
    pub players: Vec<Player>,
    pub host_player_id: Option<PlayerId>,
    pub dedicated_server_id: ServerId,
    pub host_address: Option<String>,
    pub host_internal_address: Option<String>,
    pub host_port: Option<u16>,
    pub query_port: Option<u16>,
    pub start_token: String,
    pub start_token_expires_at: DateTime<Utc>,
}

/// Queue-status projection consumed by the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub ticket_id: TicketId,
    pub status: TicketStatus,
    /// 1-based position from the head of the queue, only while QUEUED.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Whole seconds until the grace countdown elapses, only while FORMING.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_in_seconds: Option<u32>,
    pub wait_for_fourth_seconds: u64,
    pub min_players: usize,
    pub max_players: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<MatchId>,
    pub players: Vec<Player>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_player_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_internal_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedicated_server_id: Option<ServerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_token_expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_status_terminality() {
        assert!(!TicketStatus::Queued.is_terminal());
        assert!(!TicketStatus::Forming.is_terminal());
        assert!(TicketStatus::Matched.is_terminal());
        assert!(TicketStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_server_status_parsing() {
        assert_eq!("ready".parse::<ServerStatus>(), Ok(ServerStatus::Ready));
        assert_eq!(" BUSY ".parse::<ServerStatus>(), Ok(ServerStatus::Busy));
        assert_eq!(
            "Registered".parse::<ServerStatus>(),
            Ok(ServerStatus::Registered)
        );
        assert!("loading".parse::<ServerStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&TicketStatus::Forming).unwrap();
        assert_eq!(json, "\"FORMING\"");

        let json = serde_json::to_string(&ServerStatus::Ready).unwrap();
        assert_eq!(json, "\"READY\"");
    }
}
