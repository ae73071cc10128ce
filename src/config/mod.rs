//! Configuration management for the ready-room service

pub mod app;

pub use app::{
    validate_config, AppConfig, MatchmakingSettings, ServiceSettings, TokenSettings,
};
