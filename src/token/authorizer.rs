//! Match-start authorization for dedicated servers
//!
//! Combines token verification, expiry, claim matching against the caller's
//! expected bindings, and a registry existence check into one ordered
//! decision. Every refusal carries a reason code the caller can branch on.

use crate::registry::ServerAllocator;
use crate::token::codec::{TokenCodec, TokenPayload};
use crate::utils::{current_timestamp, mask};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Reason a start token was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartDenial {
    TokenMissing,
    TokenInvalid,
    TokenExpired,
    DedicatedServerMismatch,
    RoomMismatch,
    MatchMismatch,
    DedicatedServerNotRegistered,
}

impl StartDenial {
    pub fn code(&self) -> &'static str {
        match self {
            StartDenial::TokenMissing => "TOKEN_MISSING",
            StartDenial::TokenInvalid => "TOKEN_INVALID",
            StartDenial::TokenExpired => "TOKEN_EXPIRED",
            StartDenial::DedicatedServerMismatch => "DEDICATED_SERVER_MISMATCH",
            StartDenial::RoomMismatch => "ROOM_MISMATCH",
            StartDenial::MatchMismatch => "MATCH_MISMATCH",
            StartDenial::DedicatedServerNotRegistered => "DEDICATED_SERVER_NOT_REGISTERED",
        }
    }
}

impl std::fmt::Display for StartDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Expected bindings supplied by the verifying server. Blank or absent
/// fields are not checked against the token claims.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyStartRequest {
    #[serde(default)]
    pub ds_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub match_id: Option<String>,
    #[serde(default)]
    pub start_token: Option<String>,
}

/// Authorizes match starts against the token codec and server registry
pub struct StartAuthorizer {
    tokens: Arc<TokenCodec>,
    servers: Arc<dyn ServerAllocator>,
}

impl StartAuthorizer {
    pub fn new(tokens: Arc<TokenCodec>, servers: Arc<dyn ServerAllocator>) -> Self {
        Self { tokens, servers }
    }

    pub fn authorize(&self, request: &VerifyStartRequest) -> Result<TokenPayload, StartDenial> {
        let token = match request.start_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(StartDenial::TokenMissing),
        };

        let payload = self
            .tokens
            .verify(token)
            .ok_or(StartDenial::TokenInvalid)?;

        if payload.expires_at <= current_timestamp() {
            warn!(
                "Start refused: token expired ds={} match={}",
                mask(&payload.server_id),
                mask(&payload.match_id)
            );
            return Err(StartDenial::TokenExpired);
        }

        if let Some(expected) = non_blank(&request.ds_id) {
            if payload.server_id != expected {
                return Err(StartDenial::DedicatedServerMismatch);
            }
        }

        if let Some(expected) = non_blank(&request.room_id) {
            if payload.room_id != expected {
                return Err(StartDenial::RoomMismatch);
            }
        }

        if let Some(expected) = non_blank(&request.match_id) {
            if payload.match_id != expected {
                return Err(StartDenial::MatchMismatch);
            }
        }

        if self.servers.find(&payload.server_id).is_none() {
            return Err(StartDenial::DedicatedServerNotRegistered);
        }

        Ok(payload)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
