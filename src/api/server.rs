//! Axum HTTP server exposing the matchmaking endpoints
//!
//! Player identity arrives in headers (`X-Player-Id`, `X-Player-Nickname`);
//! the origin address is taken from `X-Forwarded-For` when present, falling
//! back to the socket peer address. Error responses carry a stable `error`
//! code the game client branches on.

use crate::error::Result;
use crate::registry::{ServerAllocator, ServerRegistration};
use crate::service::app::AppState;
use crate::service::health::HealthStatus;
use crate::token::VerifyStartRequest;
use crate::types::{QueueStatus, ServerRecord, ServerStatus};
use anyhow::Context;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Host to bind to (typically "0.0.0.0" for all interfaces)
    pub host: String,
    /// Port to bind the API server to
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Shared state for the API handlers
#[derive(Clone)]
pub struct ApiState {
    pub app: Arc<AppState>,
}

/// HTTP server for the matchmaking, registry, and verification endpoints
pub struct ApiServer {
    config: ApiServerConfig,
    state: ApiState,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, app: Arc<AppState>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state: ApiState { app },
            shutdown_tx,
        }
    }

    /// Start serving. Returns once a shutdown signal arrives.
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid API server address")?;

        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("API server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("API server shutdown signal received");
        })
        .await?;

        info!("API server stopped");
        Ok(())
    }

    /// Create the Axum router with all endpoints
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/api/matches/queue", post(enqueue_handler))
            .route("/api/matches/queue/{ticket_id}", get(status_handler))
            .route(
                "/api/matches/queue/{ticket_id}/cancel",
                post(cancel_handler),
            )
            .route("/api/ds/register", post(register_server_handler))
            .route("/api/ds/matches/verify-start", post(verify_start_handler))
            .route("/api/ds/{server_id}/status", post(server_status_handler))
            .route("/api/ds/{server_id}", get(get_server_handler))
            .with_state(self.state.clone())
    }

    /// Stop the API server
    pub fn stop(&self) {
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!("Failed to send shutdown signal to API server: {}", e);
        }
    }
}

/// Error response carrying a stable machine-readable code
struct ApiError {
    status: StatusCode,
    code: &'static str,
}

impl ApiError {
    fn bad_request(code: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
        }
    }

    fn not_found(code: &'static str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.code }))).into_response()
    }
}

fn require_player_id(headers: &HeaderMap) -> std::result::Result<String, ApiError> {
    headers
        .get("x-player-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("PLAYER_ID_REQUIRED"))
}

fn resolve_nickname(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-player-nickname")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn resolve_origin_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string())
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "ready-room",
        "version": crate::VERSION,
        "endpoints": [
            "/health",
            "/api/matches/queue",
            "/api/ds/register",
            "/api/ds/matches/verify-start"
        ]
    }))
}

async fn health_handler(State(state): State<ApiState>) -> impl IntoResponse {
    debug!("Health check requested");
    let report = state.app.health();
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

async fn enqueue_handler(
    State(state): State<ApiState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> std::result::Result<Json<QueueStatus>, ApiError> {
    let player_id = require_player_id(&headers)?;
    let nickname = resolve_nickname(&headers);
    let address = resolve_origin_address(&headers, peer);

    let status = state
        .app
        .engine()
        .enqueue(&player_id, nickname.as_deref(), Some(&address));
    Ok(Json(status))
}

async fn status_handler(
    State(state): State<ApiState>,
    Path(ticket_id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<QueueStatus>, ApiError> {
    let player_id = require_player_id(&headers)?;
    state
        .app
        .engine()
        .status(&player_id, &ticket_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("TICKET_NOT_FOUND"))
}

async fn cancel_handler(
    State(state): State<ApiState>,
    Path(ticket_id): Path<String>,
    headers: HeaderMap,
) -> std::result::Result<Json<QueueStatus>, ApiError> {
    let player_id = require_player_id(&headers)?;
    state
        .app
        .engine()
        .cancel(&player_id, &ticket_id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("TICKET_NOT_FOUND"))
}

/// Registration request from a dedicated server
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterServerRequest {
    #[serde(default)]
    ds_id: Option<String>,
    #[serde(default)]
    public_address: Option<String>,
    #[serde(default)]
    internal_address: Option<String>,
    #[serde(default)]
    game_port: Option<i32>,
    #[serde(default)]
    query_port: Option<i32>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateServerStatusRequest {
    status: String,
}

/// Response mirror of a registry record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerRecordResponse {
    ds_id: String,
    public_address: Option<String>,
    internal_address: Option<String>,
    game_port: Option<u16>,
    query_port: Option<u16>,
    status: ServerStatus,
    last_updated: DateTime<Utc>,
}

impl From<ServerRecord> for ServerRecordResponse {
    fn from(record: ServerRecord) -> Self {
        Self {
            ds_id: record.server_id,
            public_address: record.public_address,
            internal_address: record.internal_address,
            game_port: record.game_port,
            query_port: record.query_port,
            status: record.status,
            last_updated: record.last_updated,
        }
    }
}

fn to_port(value: Option<i32>) -> Option<u16> {
    value
        .filter(|port| *port > 0 && *port <= u16::MAX as i32)
        .map(|port| port as u16)
}

fn parse_status(value: Option<&str>) -> std::result::Result<Option<ServerStatus>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<ServerStatus>()
            .map(Some)
            .map_err(|_| ApiError::bad_request("INVALID_SERVER_STATUS")),
        None => Ok(None),
    }
}

async fn register_server_handler(
    State(state): State<ApiState>,
    Json(request): Json<RegisterServerRequest>,
) -> std::result::Result<Json<ServerRecordResponse>, ApiError> {
    let status = parse_status(request.status.as_deref())?;

    let record = state
        .app
        .registry()
        .register_or_update(
            request.ds_id.as_deref().unwrap_or(""),
            ServerRegistration {
                public_address: request.public_address,
                internal_address: request.internal_address,
                game_port: to_port(request.game_port),
                query_port: to_port(request.query_port),
                status,
            },
        )
        .map_err(|_| ApiError::bad_request("DEDICATED_SERVER_ID_REQUIRED"))?;

    Ok(Json(record.into()))
}

async fn server_status_handler(
    State(state): State<ApiState>,
    Path(server_id): Path<String>,
    Json(request): Json<UpdateServerStatusRequest>,
) -> std::result::Result<Json<ServerRecordResponse>, ApiError> {
    let status = parse_status(Some(&request.status))?
        .ok_or_else(|| ApiError::bad_request("INVALID_SERVER_STATUS"))?;

    state
        .app
        .registry()
        .update_status(&server_id, status)
        .map(|record| Json(record.into()))
        .ok_or_else(|| ApiError::not_found("DEDICATED_SERVER_NOT_FOUND"))
}

async fn get_server_handler(
    State(state): State<ApiState>,
    Path(server_id): Path<String>,
) -> std::result::Result<Json<ServerRecordResponse>, ApiError> {
    state
        .app
        .registry()
        .find(&server_id)
        .map(|record| Json(record.into()))
        .ok_or_else(|| ApiError::not_found("DEDICATED_SERVER_NOT_FOUND"))
}

/// Verification outcome returned to the dedicated server
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyStartResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    match_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dedicated_server_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

async fn verify_start_handler(
    State(state): State<ApiState>,
    Json(request): Json<VerifyStartRequest>,
) -> Json<VerifyStartResponse> {
    match state.app.authorizer().authorize(&request) {
        Ok(payload) => Json(VerifyStartResponse {
            success: true,
            error: None,
            room_id: Some(payload.room_id),
            match_id: Some(payload.match_id),
            dedicated_server_id: Some(payload.server_id),
            expires_at: Some(payload.expires_at),
        }),
        Err(denial) => Json(VerifyStartResponse {
            success: false,
            error: Some(denial.code()),
            room_id: None,
            match_id: None,
            dedicated_server_id: None,
            expires_at: None,
        }),
    }
}
