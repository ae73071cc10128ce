//! Ticket and pending-match bookkeeping owned by the engine

use crate::types::{MatchId, MatchInfo, Player, TicketId, TicketStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One player's matchmaking request
#[derive(Debug)]
pub(crate) struct Ticket {
    pub ticket_id: TicketId,
    pub player: Player,
    /// Origin network address as reported by the transport; informational.
    pub address: Option<String>,
    pub status: TicketStatus,
    pub match_info: Option<Arc<MatchInfo>>,
}

impl Ticket {
    pub fn new(ticket_id: TicketId, player: Player, address: Option<String>) -> Self {
        let address = address
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        Self {
            ticket_id,
            player,
            address,
            status: TicketStatus::Queued,
            match_info: None,
        }
    }
}

/// A candidate match being assembled around the minimum group size.
///
/// The engine holds at most one of these at a time; the first member hosts.
#[derive(Debug)]
pub(crate) struct PendingMatch {
    pub match_id: MatchId,
    /// Member tickets in join order.
    pub members: Vec<TicketId>,
    pub deadline: DateTime<Utc>,
    /// Bumped on every countdown reschedule so a stale firing can be told
    /// apart from the live one even though the match id stays the same.
    pub generation: u64,
    pub countdown: Option<JoinHandle<()>>,
}

impl PendingMatch {
    pub fn new(match_id: MatchId) -> Self {
        Self {
            match_id,
            members: Vec::new(),
            deadline: Utc::now(),
            generation: 0,
            countdown: None,
        }
    }

    /// Best-effort: a timer already mid-fire is filtered by the engine's
    /// identity re-check instead.
    pub fn cancel_countdown(&mut self) {
        if let Some(handle) = self.countdown.take() {
            handle.abort();
        }
    }
}
