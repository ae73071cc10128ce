//! HTTP surface for the matchmaking queue, server registry, and
//! start-token verification

pub mod server;

pub use server::{ApiServer, ApiServerConfig};
