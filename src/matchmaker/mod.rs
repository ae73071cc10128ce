//! Ticket queue, match formation, and match launch

pub mod engine;
pub mod ticket;

pub use engine::{EngineStats, MatchmakingEngine};
