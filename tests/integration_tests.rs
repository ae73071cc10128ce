//! Integration tests for the ready-room matchmaking service
//!
//! These tests validate the system working together, including:
//! - Complete queue-to-match lifecycles against the server registry
//! - Grace-window and allocation-retry timing
//! - Cancellation unwinding and group re-formation
//! - Start-token issuance and verification by a dedicated server
//! - Concurrent enqueueing

use chrono::Duration as ChronoDuration;
use futures::future::join_all;
use ready_room::config::MatchmakingSettings;
use ready_room::registry::{DedicatedServerRegistry, ServerAllocator, ServerRegistration};
use ready_room::token::{StartAuthorizer, TokenCodec, VerifyStartRequest};
use ready_room::types::{ServerStatus, TicketStatus};
use ready_room::MatchmakingEngine;
use std::sync::Arc;
use std::time::Duration;

/// Integration test setup that creates a complete system
fn create_test_system() -> (
    MatchmakingEngine,
    Arc<DedicatedServerRegistry>,
    StartAuthorizer,
) {
    let registry = Arc::new(DedicatedServerRegistry::new());
    let tokens = Arc::new(
        TokenCodec::new("integration-secret", ChronoDuration::seconds(60)).unwrap(),
    );

    let engine = MatchmakingEngine::new(
        MatchmakingSettings::default(),
        Arc::clone(&registry) as Arc<dyn ServerAllocator>,
        Arc::clone(&tokens),
    );
    let authorizer = StartAuthorizer::new(
        tokens,
        Arc::clone(&registry) as Arc<dyn ServerAllocator>,
    );

    (engine, registry, authorizer)
}

fn register_ready(registry: &DedicatedServerRegistry, server_id: &str) {
    registry
        .register_or_update(
            server_id,
            ServerRegistration {
                public_address: Some(format!("{server_id}.example.com")),
                internal_address: Some("10.0.0.1".to_string()),
                game_port: Some(7777),
                query_port: Some(27015),
                status: Some(ServerStatus::Ready),
            },
        )
        .unwrap();
}

#[tokio::test]
async fn test_full_match_lifecycle_with_token_verification() {
    let (engine, registry, authorizer) = create_test_system();
    register_ready(&registry, "ds-1");

    // Four players fill the group; the match starts without a countdown.
    let mut tickets = Vec::new();
    for player in ["p1", "p2", "p3", "p4"] {
        let status = engine.enqueue(player, Some(player), Some("203.0.113.7"));
        tickets.push((player, status.ticket_id));
    }

    let status = engine.status("p1", &tickets[0].1).unwrap();
    assert_eq!(status.status, TicketStatus::Matched);
    assert_eq!(status.host_player_id.as_deref(), Some("p1"));
    assert_eq!(status.dedicated_server_id.as_deref(), Some("ds-1"));
    assert_eq!(status.host_address.as_deref(), Some("ds-1.example.com"));
    assert_eq!(status.host_port, Some(7777));
    assert_eq!(status.players.len(), 4);

    // The allocated server went BUSY.
    assert_eq!(registry.find("ds-1").unwrap().status, ServerStatus::Busy);

    // The dedicated server presents the start token back for verification,
    // pinned to its own identity and the match it was told to host.
    let token = status.start_token.clone().unwrap();
    let match_id = status.match_id.clone().unwrap();
    let payload = authorizer
        .authorize(&VerifyStartRequest {
            ds_id: Some("ds-1".to_string()),
            room_id: Some(match_id.clone()),
            match_id: Some(match_id.clone()),
            start_token: Some(token.clone()),
        })
        .unwrap();
    assert_eq!(payload.server_id, "ds-1");
    assert_eq!(payload.match_id, match_id);

    // A token pinned to the wrong server is refused.
    let denial = authorizer
        .authorize(&VerifyStartRequest {
            ds_id: Some("ds-2".to_string()),
            start_token: Some(token),
            ..VerifyStartRequest::default()
        })
        .unwrap_err();
    assert_eq!(denial.code(), "DEDICATED_SERVER_MISMATCH");

    println!("Full match lifecycle test passed");
}

#[tokio::test(start_paused = true)]
async fn test_group_of_three_matches_after_grace_window() {
    let (engine, registry, _) = create_test_system();
    register_ready(&registry, "ds-1");

    let first = engine.enqueue("p1", None, None);
    engine.enqueue("p2", None, None);
    let third = engine.enqueue("p3", None, None);

    assert_eq!(third.status, TicketStatus::Forming);
    assert_eq!(third.ready_in_seconds, Some(5));

    // Nobody else joins; the countdown resolves the group of three.
    tokio::time::sleep(Duration::from_secs(6)).await;

    let status = engine.status("p1", &first.ticket_id).unwrap();
    assert_eq!(status.status, TicketStatus::Matched);
    assert_eq!(status.players.len(), 3);

    println!("Grace-window match test passed");
}

#[tokio::test(start_paused = true)]
async fn test_stalled_allocation_resolves_when_server_reports_ready() {
    let (engine, registry, _) = create_test_system();

    // The server exists but is still loading.
    registry
        .register_or_update("ds-1", ServerRegistration::default())
        .unwrap();

    for player in ["p1", "p2", "p3"] {
        engine.enqueue(player, None, None);
    }

    // The grace window elapses with no READY server; the group must keep
    // waiting rather than fail.
    tokio::time::sleep(Duration::from_secs(8)).await;
    let status = engine.status("p1", "t_1").unwrap();
    assert_eq!(status.status, TicketStatus::Forming);

    // The server finishes loading and self-reports READY; the retry loop
    // picks it up.
    registry.update_status("ds-1", ServerStatus::Ready).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let status = engine.status("p1", "t_1").unwrap();
    assert_eq!(status.status, TicketStatus::Matched);

    println!("Stalled allocation test passed");
}

#[tokio::test]
async fn test_cancellation_dissolves_and_reforms_group() {
    let (engine, _, _) = create_test_system();

    engine.enqueue("p1", None, None);
    let second = engine.enqueue("p2", None, None);
    engine.enqueue("p3", None, None);

    // Dropping to two dissolves the group back into the queue.
    engine.cancel("p2", &second.ticket_id).unwrap();
    let first = engine.status("p1", "t_1").unwrap();
    assert_eq!(first.status, TicketStatus::Queued);
    assert_eq!(first.position, Some(1));

    // A replacement arrives and a new group forms from the survivors.
    let fourth = engine.enqueue("p4", None, None);
    assert_eq!(fourth.status, TicketStatus::Forming);
    let roster: Vec<_> = fourth
        .players
        .iter()
        .map(|player| player.player_id.as_str())
        .collect();
    assert_eq!(roster, vec!["p1", "p3", "p4"]);

    println!("Cancellation unwinding test passed");
}

#[tokio::test]
async fn test_server_returns_to_rotation_after_match() {
    let (engine, registry, _) = create_test_system();
    register_ready(&registry, "ds-1");

    for player in ["p1", "p2", "p3", "p4"] {
        engine.enqueue(player, None, None);
    }
    assert_eq!(registry.find("ds-1").unwrap().status, ServerStatus::Busy);

    // The match ends and the server reports READY again; a second wave of
    // players can be hosted on it.
    registry.update_status("ds-1", ServerStatus::Ready).unwrap();

    for player in ["p5", "p6", "p7", "p8"] {
        engine.enqueue(player, None, None);
    }
    let status = engine.status("p5", "t_5").unwrap();
    assert_eq!(status.status, TicketStatus::Matched);
    assert_eq!(status.dedicated_server_id.as_deref(), Some("ds-1"));
    assert_ne!(status.match_id, engine.status("p1", "t_1").unwrap().match_id);

    println!("Server rotation test passed");
}

#[tokio::test]
async fn test_concurrent_enqueueing_assigns_unique_tickets() {
    let (engine, registry, _) = create_test_system();
    register_ready(&registry, "ds-1");
    register_ready(&registry, "ds-2");

    let tasks: Vec<_> = (0..8)
        .map(|index| {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine.enqueue(&format!("player-{index}"), None, None)
            })
        })
        .collect();

    let statuses: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    let mut ticket_ids: Vec<_> = statuses
        .iter()
        .map(|status| status.ticket_id.clone())
        .collect();
    ticket_ids.sort();
    ticket_ids.dedup();
    assert_eq!(ticket_ids.len(), 8);

    let stats = engine.stats();
    assert_eq!(stats.tickets_created, 8);
    // Eight players resolve into two full matches on the two servers.
    assert_eq!(stats.matches_started, 2);
    assert_eq!(stats.players_matched, 8);

    println!("Concurrent enqueueing test passed");
}

#[tokio::test]
async fn test_expired_token_is_refused_by_authorizer() {
    let registry = Arc::new(DedicatedServerRegistry::new());
    register_ready(&registry, "ds-1");

    // A codec with a negative TTL mints tokens that are already expired,
    // standing in for a token presented after its lifetime.
    let tokens = Arc::new(
        TokenCodec::new("integration-secret", ChronoDuration::seconds(-5)).unwrap(),
    );
    let authorizer = StartAuthorizer::new(
        Arc::clone(&tokens),
        Arc::clone(&registry) as Arc<dyn ServerAllocator>,
    );

    let issued = tokens.issue("ds-1", "m_1", "m_1");
    // Verification alone still succeeds; expiry is the authorizer's check.
    assert!(tokens.verify(&issued.token).is_some());

    let denial = authorizer
        .authorize(&VerifyStartRequest {
            start_token: Some(issued.token),
            ..VerifyStartRequest::default()
        })
        .unwrap_err();
    assert_eq!(denial.code(), "TOKEN_EXPIRED");

    println!("Expired token test passed");
}
