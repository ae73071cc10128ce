//! Ready Room - matchmaking and match-launch microservice
//!
//! This crate batches individual players into match groups, waits a short
//! grace window for late joiners, allocates a dedicated game server to each
//! group, and issues signed, time-bounded start tokens the server uses to
//! authorize the match.

pub mod api;
pub mod config;
pub mod error;
pub mod matchmaker;
pub mod registry;
pub mod service;
pub mod token;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use matchmaker::{EngineStats, MatchmakingEngine};
pub use registry::{DedicatedServerRegistry, ServerAllocator};
pub use token::{StartAuthorizer, TokenCodec};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
