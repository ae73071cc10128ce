//! Queue Tester CLI Tool
//!
//! Drives an in-process matchmaking engine through scripted scenarios so the
//! formation, countdown, and cancellation behavior can be watched from a
//! terminal without standing up the HTTP service.
//!
//! Usage:
//!   cargo run --bin queue-tester -- --help
//!   cargo run --bin queue-tester run-scenario --scenario instant-four
//!   cargo run --bin queue-tester run-scenario --scenario grace-three
//!   cargo run --bin queue-tester soak --players 12 --servers 3

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use ready_room::config::MatchmakingSettings;
use ready_room::registry::{DedicatedServerRegistry, ServerAllocator, ServerRegistration};
use ready_room::token::TokenCodec;
use ready_room::types::{QueueStatus, ServerStatus, TicketStatus};
use ready_room::MatchmakingEngine;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "queue-tester")]
#[command(about = "Scenario driver for the ready-room matchmaking engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario end to end
    RunScenario {
        /// Scenario name: instant-four, grace-three, cancel-dissolve
        #[arg(short, long)]
        scenario: String,
    },
    /// Churn many players through the queue and report engine stats
    Soak {
        /// Number of players to enqueue
        #[arg(long, default_value_t = 12)]
        players: usize,
        /// Number of READY dedicated servers to register
        #[arg(long, default_value_t = 3)]
        servers: usize,
    },
}

struct Harness {
    engine: MatchmakingEngine,
    registry: Arc<DedicatedServerRegistry>,
}

impl Harness {
    fn new() -> Result<Self> {
        let registry = Arc::new(DedicatedServerRegistry::new());
        let tokens = Arc::new(TokenCodec::new(
            "queue-tester-secret",
            chrono::Duration::seconds(300),
        )?);
        let engine = MatchmakingEngine::new(
            MatchmakingSettings::default(),
            Arc::clone(&registry) as Arc<dyn ServerAllocator>,
            tokens,
        );
        Ok(Self { engine, registry })
    }

    fn register_servers(&self, count: usize) -> Result<()> {
        for index in 1..=count {
            self.registry.register_or_update(
                &format!("ds-{index}"),
                ServerRegistration {
                    public_address: Some(format!("ds-{index}.example.com")),
                    internal_address: Some(format!("10.0.0.{index}")),
                    game_port: Some(7777),
                    query_port: Some(27015),
                    status: Some(ServerStatus::Ready),
                },
            )?;
        }
        println!("Registered {count} READY dedicated servers");
        Ok(())
    }

    fn print_status(&self, label: &str, status: &QueueStatus) {
        match status.status {
            TicketStatus::Queued => {
                println!(
                    "  {label}: {} position={:?}",
                    status.status, status.position
                );
            }
            TicketStatus::Forming => {
                println!(
                    "  {label}: {} ready_in={:?}s roster={}",
                    status.status,
                    status.ready_in_seconds,
                    status.players.len()
                );
            }
            TicketStatus::Matched => {
                println!(
                    "  {label}: {} match={:?} server={:?} host={:?}",
                    status.status,
                    status.match_id,
                    status.dedicated_server_id,
                    status.host_player_id
                );
            }
            TicketStatus::Cancelled => {
                println!("  {label}: {}", status.status);
            }
        }
    }
}

async fn run_instant_four(harness: &Harness) -> Result<()> {
    println!("Scenario: four players fill the group and start immediately");
    harness.register_servers(1)?;

    for player in ["alice", "bob", "carol", "dave"] {
        let status = harness.engine.enqueue(player, Some(player), None);
        harness.print_status(player, &status);
    }

    Ok(())
}

async fn run_grace_three(harness: &Harness) -> Result<()> {
    println!("Scenario: three players, match starts after the grace window");
    harness.register_servers(1)?;

    let mut tickets = Vec::new();
    for player in ["alice", "bob", "carol"] {
        let status = harness.engine.enqueue(player, Some(player), None);
        harness.print_status(player, &status);
        tickets.push((player, status.ticket_id));
    }

    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let (player, ticket_id) = &tickets[0];
        let status = harness
            .engine
            .status(player, ticket_id)
            .ok_or_else(|| anyhow!("ticket vanished mid-scenario"))?;
        harness.print_status(player, &status);
        if status.status == TicketStatus::Matched {
            break;
        }
    }

    Ok(())
}

async fn run_cancel_dissolve(harness: &Harness) -> Result<()> {
    println!("Scenario: a cancellation dissolves the forming group");
    harness.register_servers(1)?;

    let mut tickets = Vec::new();
    for player in ["alice", "bob", "carol"] {
        let status = harness.engine.enqueue(player, Some(player), None);
        tickets.push((player, status.ticket_id));
    }

    println!("Cancelling bob...");
    let (_, bob_ticket) = &tickets[1];
    harness
        .engine
        .cancel("bob", bob_ticket)
        .ok_or_else(|| anyhow!("bob's ticket was not cancellable"))?;

    for (player, ticket_id) in [&tickets[0], &tickets[2]] {
        let status = harness
            .engine
            .status(player, ticket_id)
            .ok_or_else(|| anyhow!("ticket vanished mid-scenario"))?;
        harness.print_status(player, &status);
    }

    Ok(())
}

async fn run_soak(harness: &Harness, players: usize, servers: usize) -> Result<()> {
    println!("Soak: {players} players across {servers} servers");
    harness.register_servers(servers)?;

    for index in 1..=players {
        harness
            .engine
            .enqueue(&format!("player-{index}"), None, None);
    }

    // Give countdown-driven matches time to resolve.
    tokio::time::sleep(Duration::from_secs(7)).await;

    let stats = harness.engine.stats();
    println!("Engine stats:");
    println!("  tickets created:  {}", stats.tickets_created);
    println!("  matches started:  {}", stats.matches_started);
    println!("  players matched:  {}", stats.players_matched);
    println!("  still queued:     {}", stats.queue_depth);
    println!("  still forming:    {}", stats.forming_players);

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let harness = Harness::new()?;

    match cli.command {
        Commands::RunScenario { scenario } => match scenario.as_str() {
            "instant-four" => run_instant_four(&harness).await?,
            "grace-three" => run_grace_three(&harness).await?,
            "cancel-dissolve" => run_cancel_dissolve(&harness).await?,
            other => {
                return Err(anyhow!(
                    "Unknown scenario '{other}'; expected instant-four, grace-three, or cancel-dissolve"
                ))
            }
        },
        Commands::Soak { players, servers } => run_soak(&harness, players, servers).await?,
    }

    Ok(())
}
