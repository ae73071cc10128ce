//! Service orchestration and application state management

pub mod app;
pub mod health;

pub use app::AppState;
pub use health::{HealthReport, HealthStatus, ServiceStats};
