//! Matchmaking engine: FIFO ticket queue, single-lane match formation,
//! grace countdowns, and match launch against the server registry.
//!
//! All mutable engine state sits behind one mutex and every public operation
//! holds it for its whole critical section; the FIFO/grouping/countdown
//! interplay is only correct when state transitions are serialized.
//! Countdowns are tokio tasks that re-acquire the lock when they fire and
//! re-check the pending match identity (match id plus countdown generation),
//! so a cancelled or superseded timer firing late is a no-op.

use crate::config::MatchmakingSettings;
use crate::matchmaker::ticket::{PendingMatch, Ticket};
use crate::registry::ServerAllocator;
use crate::token::TokenCodec;
use crate::types::{MatchInfo, Player, QueueStatus, TicketId, TicketStatus};
use crate::utils::{current_timestamp, mask, preview};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Counters reported through health and stats endpoints
#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineStats {
    pub tickets_created: u64,
    pub tickets_cancelled: u64,
    pub matches_started: u64,
    pub players_matched: u64,
    pub queue_depth: usize,
    pub forming_players: usize,
}

/// The matchmaking engine. Cheap to clone; all clones share one state.
#[derive(Clone)]
pub struct MatchmakingEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    state: Mutex<EngineState>,
    ticket_seq: AtomicU64,
    match_seq: AtomicU64,
    allocator: Arc<dyn ServerAllocator>,
    tokens: Arc<TokenCodec>,
    settings: MatchmakingSettings,
}

#[derive(Default)]
struct EngineState {
    queue: VecDeque<TicketId>,
    tickets: HashMap<TicketId, Ticket>,
    by_player: HashMap<String, TicketId>,
    pending: Option<PendingMatch>,
    tickets_created: u64,
    tickets_cancelled: u64,
    matches_started: u64,
    players_matched: u64,
}

impl MatchmakingEngine {
    pub fn new(
        settings: MatchmakingSettings,
        allocator: Arc<dyn ServerAllocator>,
        tokens: Arc<TokenCodec>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(EngineState::default()),
                ticket_seq: AtomicU64::new(1),
                match_seq: AtomicU64::new(1),
                allocator,
                tokens,
                settings,
            }),
        }
    }

    pub fn settings(&self) -> &MatchmakingSettings {
        &self.inner.settings
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().expect("engine state lock poisoned")
    }

    /// Enter the queue. Idempotent while the player already holds an active
    /// ticket; a terminal leftover is purged and replaced.
    pub fn enqueue(
        &self,
        player_id: &str,
        nickname: Option<&str>,
        address: Option<&str>,
    ) -> QueueStatus {
        let now = current_timestamp();
        let mut state = self.lock_state();

        if let Some(existing_id) = state.by_player.get(player_id).cloned() {
            match state.tickets.get(&existing_id) {
                Some(ticket) if !ticket.status.is_terminal() => {
                    debug!(
                        "Player {} already holds active ticket {}",
                        mask(player_id),
                        existing_id
                    );
                    return self.snapshot(&state, ticket, now);
                }
                _ => {}
            }
            // Terminal leftover from an earlier match or cancellation.
            self.purge_ticket(&mut state, &existing_id);
        }

        let ticket_id = format!("t_{}", self.inner.ticket_seq.fetch_add(1, Ordering::Relaxed));
        let nickname = nickname
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(player_id)
            .to_string();
        let ticket = Ticket::new(
            ticket_id.clone(),
            Player {
                player_id: player_id.to_string(),
                nickname,
            },
            address.map(str::to_string),
        );
        debug!(
            "Ticket {} origin address {}",
            ticket_id,
            ticket.address.as_deref().unwrap_or("<unknown>")
        );

        state.tickets.insert(ticket_id.clone(), ticket);
        state.by_player.insert(player_id.to_string(), ticket_id.clone());
        state.tickets_created += 1;
        info!("Enqueued ticket {} for player {}", ticket_id, mask(player_id));

        self.assign_ticket(&mut state, &ticket_id, now);

        let ticket = state
            .tickets
            .get(&ticket_id)
            .expect("ticket registered in this critical section");
        self.snapshot(&state, ticket, now)
    }

    /// Read-only projection. `None` when the ticket does not exist or does
    /// not belong to the caller.
    pub fn status(&self, player_id: &str, ticket_id: &str) -> Option<QueueStatus> {
        let now = current_timestamp();
        let state = self.lock_state();
        let ticket = state.tickets.get(ticket_id)?;
        if ticket.player.player_id != player_id {
            return None;
        }
        Some(self.snapshot(&state, ticket, now))
    }

    /// Cancel a ticket. `None` under the same ownership rule as `status`;
    /// a MATCHED ticket is reported unchanged since a resolved match cannot
    /// be unwound.
    pub fn cancel(&self, player_id: &str, ticket_id: &str) -> Option<QueueStatus> {
        let now = current_timestamp();
        let mut state = self.lock_state();

        let status = {
            let ticket = state.tickets.get(ticket_id)?;
            if ticket.player.player_id != player_id {
                return None;
            }
            ticket.status
        };

        match status {
            TicketStatus::Matched => {
                let ticket = state.tickets.get(ticket_id)?;
                Some(self.snapshot(&state, ticket, now))
            }
            TicketStatus::Queued => {
                state.queue.retain(|id| id != ticket_id);
                let mut ticket = self.purge_ticket(&mut state, ticket_id)?;
                ticket.status = TicketStatus::Cancelled;
                state.tickets_cancelled += 1;
                info!(
                    "Cancelled queued ticket {} for player {}",
                    ticket_id,
                    mask(player_id)
                );
                Some(self.snapshot(&state, &ticket, now))
            }
            TicketStatus::Forming => {
                self.remove_from_pending(&mut state, ticket_id, now);
                let mut ticket = self.purge_ticket(&mut state, ticket_id)?;
                ticket.status = TicketStatus::Cancelled;
                state.tickets_cancelled += 1;
                info!(
                    "Cancelled forming ticket {} for player {}",
                    ticket_id,
                    mask(player_id)
                );
                Some(self.snapshot(&state, &ticket, now))
            }
            TicketStatus::Cancelled => {
                // Stale terminal leftover; drop it from the indexes.
                let mut ticket = self.purge_ticket(&mut state, ticket_id)?;
                ticket.status = TicketStatus::Cancelled;
                Some(self.snapshot(&state, &ticket, now))
            }
        }
    }

    /// Current engine counters.
    pub fn stats(&self) -> EngineStats {
        let state = self.lock_state();
        EngineStats {
            tickets_created: state.tickets_created,
            tickets_cancelled: state.tickets_cancelled,
            matches_started: state.matches_started,
            players_matched: state.players_matched,
            queue_depth: state.queue.len(),
            forming_players: state
                .pending
                .as_ref()
                .map(|pending| pending.members.len())
                .unwrap_or(0),
        }
    }

    /// Stop the in-flight countdown, if any. Used during service shutdown.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        if let Some(pending) = state.pending.as_mut() {
            pending.cancel_countdown();
        }
    }

    fn assign_ticket(&self, state: &mut EngineState, ticket_id: &str, now: DateTime<Utc>) {
        let max_players = self.inner.settings.max_players;

        let joined_pending = match state.pending.as_mut() {
            Some(pending) if pending.members.len() < max_players => {
                pending.members.push(ticket_id.to_string());
                true
            }
            _ => false,
        };

        if joined_pending {
            if let Some(ticket) = state.tickets.get_mut(ticket_id) {
                ticket.status = TicketStatus::Forming;
            }
            let full = state
                .pending
                .as_ref()
                .map(|pending| pending.members.len() >= max_players)
                .unwrap_or(false);
            if full {
                self.start_match(state, now);
            }
            return;
        }

        state.queue.push_back(ticket_id.to_string());
        self.try_promote(state, now);
    }

    /// Pop `min_players` head tickets into a fresh pending match and start
    /// the grace countdown. No-op while a pending match exists or the queue
    /// is short.
    fn try_promote(&self, state: &mut EngineState, now: DateTime<Utc>) {
        if state.pending.is_some() {
            return;
        }
        let min_players = self.inner.settings.min_players;
        if state.queue.len() < min_players {
            return;
        }

        let match_id = format!("m_{}", self.inner.match_seq.fetch_add(1, Ordering::Relaxed));
        let mut pending = PendingMatch::new(match_id.clone());
        for _ in 0..min_players {
            if let Some(ticket_id) = state.queue.pop_front() {
                if let Some(ticket) = state.tickets.get_mut(&ticket_id) {
                    ticket.status = TicketStatus::Forming;
                }
                pending.members.push(ticket_id);
            }
        }

        let wait = self.inner.settings.wait_for_fourth_seconds;
        pending.deadline = now + chrono::Duration::seconds(wait as i64);
        pending.countdown = Some(self.spawn_countdown(
            match_id.clone(),
            pending.generation,
            StdDuration::from_secs(wait),
        ));
        info!(
            "Promoted {} tickets into pending match {}; grace window {}s",
            pending.members.len(),
            match_id,
            wait
        );
        state.pending = Some(pending);
    }

    fn spawn_countdown(
        &self,
        match_id: String,
        generation: u64,
        delay: StdDuration,
    ) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.on_countdown_finished(&match_id, generation);
        })
    }

    fn on_countdown_finished(&self, match_id: &str, generation: u64) {
        let now = current_timestamp();
        let mut state = self.lock_state();

        let live = state
            .pending
            .as_ref()
            .map(|pending| pending.match_id == match_id && pending.generation == generation)
            .unwrap_or(false);
        if live {
            debug!("Grace window elapsed for match {}", match_id);
            self.start_match(&mut state, now);
        } else {
            debug!("Ignoring stale countdown for match {}", match_id);
        }
    }

    /// Resolve the pending match: allocate a server, mint the start token,
    /// and stamp every member MATCHED. With no READY server the group stays
    /// FORMING and a short retry countdown is scheduled instead.
    fn start_match(&self, state: &mut EngineState, now: DateTime<Utc>) {
        let Some(mut pending) = state.pending.take() else {
            return;
        };
        pending.cancel_countdown();

        let Some(server) = self.inner.allocator.allocate_ready_server() else {
            let retry = self.inner.settings.allocation_retry_seconds;
            pending.generation += 1;
            pending.deadline = now + chrono::Duration::seconds(retry as i64);
            pending.countdown = Some(self.spawn_countdown(
                pending.match_id.clone(),
                pending.generation,
                StdDuration::from_secs(retry),
            ));
            warn!(
                "No READY dedicated server for match {}; retrying in {}s",
                pending.match_id, retry
            );
            state.pending = Some(pending);
            return;
        };

        let players: Vec<Player> = pending
            .members
            .iter()
            .filter_map(|member_id| state.tickets.get(member_id))
            .map(|ticket| ticket.player.clone())
            .collect();
        let host_player_id = pending
            .members
            .first()
            .and_then(|member_id| state.tickets.get(member_id))
            .map(|ticket| ticket.player.player_id.clone());

        let issued = self
            .inner
            .tokens
            .issue(&server.server_id, &pending.match_id, &pending.match_id);
        info!(
            "Issued start token match={} ds={} len={} prefix={} players={}",
            pending.match_id,
            mask(&server.server_id),
            issued.token.len(),
            preview(&issued.token, 8),
            players.len()
        );

        let info = Arc::new(MatchInfo {
            match_id: pending.match_id.clone(),
            players,
            host_player_id,
            dedicated_server_id: server.server_id.clone(),
            host_address: server.public_address.clone(),
            host_internal_address: server.internal_address.clone(),
            host_port: server.game_port,
            query_port: server.query_port,
            start_token: issued.token.clone(),
            start_token_expires_at: issued.payload.expires_at,
        });

        for member_id in &pending.members {
            if let Some(ticket) = state.tickets.get_mut(member_id) {
                ticket.status = TicketStatus::Matched;
                ticket.match_info = Some(Arc::clone(&info));
            }
        }

        state.matches_started += 1;
        state.players_matched += pending.members.len() as u64;
        info!(
            "Match {} started on server {} with {} players",
            pending.match_id,
            mask(&server.server_id),
            pending.members.len()
        );

        // Pipelining: the next group can form without waiting for a caller.
        if state.queue.len() >= self.inner.settings.min_players {
            self.try_promote(state, now);
        }
    }

    /// Unwind a cancelled member out of the pending match. Enough members
    /// left keeps the group with a fresh full grace window; otherwise the
    /// group dissolves and the rest return to the head of the queue in their
    /// original relative order.
    fn remove_from_pending(&self, state: &mut EngineState, ticket_id: &str, now: DateTime<Utc>) {
        let Some(mut pending) = state.pending.take() else {
            return;
        };
        if !pending.members.iter().any(|member_id| member_id == ticket_id) {
            state.pending = Some(pending);
            return;
        }

        pending.members.retain(|member_id| member_id != ticket_id);
        pending.cancel_countdown();

        let min_players = self.inner.settings.min_players;
        if pending.members.len() >= min_players {
            let wait = self.inner.settings.wait_for_fourth_seconds;
            pending.generation += 1;
            pending.deadline = now + chrono::Duration::seconds(wait as i64);
            pending.countdown = Some(self.spawn_countdown(
                pending.match_id.clone(),
                pending.generation,
                StdDuration::from_secs(wait),
            ));
            info!(
                "Match {} lost a member; countdown restarted with {} players",
                pending.match_id,
                pending.members.len()
            );
            state.pending = Some(pending);
        } else {
            info!(
                "Match {} dissolved below {} players; requeueing {} members",
                pending.match_id,
                min_players,
                pending.members.len()
            );
            for member_id in pending.members.iter().rev() {
                if let Some(ticket) = state.tickets.get_mut(member_id) {
                    ticket.status = TicketStatus::Queued;
                }
                state.queue.push_front(member_id.clone());
            }
            self.try_promote(state, now);
        }
    }

    fn purge_ticket(&self, state: &mut EngineState, ticket_id: &str) -> Option<Ticket> {
        let ticket = state.tickets.remove(ticket_id)?;
        state.by_player.remove(&ticket.player.player_id);
        Some(ticket)
    }

    fn snapshot(&self, state: &EngineState, ticket: &Ticket, now: DateTime<Utc>) -> QueueStatus {
        let settings = &self.inner.settings;
        let mut status = QueueStatus {
            ticket_id: ticket.ticket_id.clone(),
            status: ticket.status,
            position: None,
            ready_in_seconds: None,
            wait_for_fourth_seconds: settings.wait_for_fourth_seconds,
            min_players: settings.min_players,
            max_players: settings.max_players,
            match_id: None,
            players: Vec::new(),
            host_player_id: None,
            host_address: None,
            host_port: None,
            host_internal_address: None,
            query_port: None,
            dedicated_server_id: None,
            start_token: None,
            start_token_expires_at: None,
        };

        match ticket.status {
            TicketStatus::Queued => {
                status.position = state
                    .queue
                    .iter()
                    .position(|queued_id| *queued_id == ticket.ticket_id)
                    .map(|index| index + 1);
            }
            TicketStatus::Forming => {
                if let Some(pending) = state.pending.as_ref() {
                    let remaining_ms = (pending.deadline - now).num_milliseconds().max(0);
                    status.ready_in_seconds = Some(((remaining_ms + 999) / 1000) as u32);
                    status.players = pending
                        .members
                        .iter()
                        .filter_map(|member_id| state.tickets.get(member_id))
                        .map(|member| member.player.clone())
                        .collect();
                }
            }
            TicketStatus::Matched => {
                if let Some(info) = ticket.match_info.as_deref() {
                    status.match_id = Some(info.match_id.clone());
                    status.players = info.players.clone();
                    status.host_player_id = info.host_player_id.clone();
                    status.host_address = info.host_address.clone();
                    status.host_port = info.host_port;
                    status.host_internal_address = info.host_internal_address.clone();
                    status.query_port = info.query_port;
                    status.dedicated_server_id = Some(info.dedicated_server_id.clone());
                    status.start_token = Some(info.start_token.clone());
                    status.start_token_expires_at = Some(info.start_token_expires_at);
                }
            }
            TicketStatus::Cancelled => {}
        }

        status
    }
}
