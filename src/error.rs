//! Error types for the matchmaking service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. Not-found conditions on tickets and servers are
//! modelled as `Option` returns at the component boundaries, not as errors.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Invalid server registration: {reason}")]
    InvalidRegistration { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
