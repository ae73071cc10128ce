//! Opaque signed start tokens
//!
//! Wire format is three dot-separated segments:
//! `<version>.<base64url-no-pad(json-claims)>.<hex-signature>`, where the
//! signature is HMAC-SHA256 over `<version>.<payload>` keyed with the shared
//! secret. Verification deliberately does not check expiry; callers compare
//! `expires_at` against their own clock so they can apply skew tolerance.

use crate::error::{MatchmakingError, Result};
use crate::types::{MatchId, ServerId};
use crate::utils::{mask, preview};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Version tag carried as the first token segment
pub const TOKEN_VERSION: &str = "v1";

/// Claims bound into a start token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub version: String,
    pub server_id: ServerId,
    pub room_id: String,
    pub match_id: MatchId,
    pub expires_at: DateTime<Utc>,
}

/// A freshly minted token together with the claims it encodes
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub payload: TokenPayload,
}

/// On-the-wire claims JSON
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "dsId")]
    ds_id: String,
    #[serde(rename = "roomId")]
    room_id: String,
    #[serde(rename = "matchId")]
    match_id: String,
    exp: String,
}

/// Signs and verifies start tokens with a shared secret and fixed TTL
pub struct TokenCodec {
    secret: String,
    ttl: Duration,
}

impl TokenCodec {
    /// A blank secret is a deployment error and refuses to construct.
    pub fn new(secret: impl Into<String>, ttl: Duration) -> Result<Self> {
        let secret = secret.into();
        if secret.trim().is_empty() {
            return Err(MatchmakingError::ConfigurationError {
                message: "token secret must not be blank".to_string(),
            }
            .into());
        }
        Ok(Self { secret, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Mint a token binding the (server, room, match) triple, expiring
    /// `ttl` from now.
    pub fn issue(&self, server_id: &str, room_id: &str, match_id: &str) -> IssuedToken {
        let expires_at = Utc::now() + self.ttl;
        let claims = Claims {
            ds_id: server_id.to_string(),
            room_id: room_id.to_string(),
            match_id: match_id.to_string(),
            exp: expires_at.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        };

        let payload_json =
            serde_json::to_vec(&claims).expect("start-token claims serialize to JSON");
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload_json);
        let signature = self.sign(&format!("{TOKEN_VERSION}.{payload_b64}"));
        let token = format!("{TOKEN_VERSION}.{payload_b64}.{signature}");

        info!(
            "Issued start token ds={} room={} match={} exp={} len={}",
            mask(server_id),
            mask(room_id),
            mask(match_id),
            expires_at,
            token.len()
        );

        IssuedToken {
            token,
            payload: TokenPayload {
                version: TOKEN_VERSION.to_string(),
                server_id: server_id.to_string(),
                room_id: room_id.to_string(),
                match_id: match_id.to_string(),
                expires_at,
            },
        }
    }

    /// Decode and authenticate a token. Returns `None` on any malformed or
    /// mismatching input; never checks expiry.
    pub fn verify(&self, token: &str) -> Option<TokenPayload> {
        if token.trim().is_empty() {
            warn!("Start token verify failed: empty token");
            return None;
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            warn!(
                "Start token verify failed: segment count {} prefix={}",
                segments.len(),
                preview(token, 12)
            );
            return None;
        }

        let (header, payload_b64, signature) = (segments[0], segments[1], segments[2]);

        if !header.eq_ignore_ascii_case(TOKEN_VERSION) {
            warn!("Start token verify failed: version mismatch header={}", header);
            return None;
        }

        let expected = self.sign(&format!("{header}.{payload_b64}"));
        if !expected.eq_ignore_ascii_case(signature) {
            warn!(
                "Start token verify failed: signature mismatch expected={} actual={}",
                preview(&expected, 8),
                preview(signature, 8)
            );
            return None;
        }

        let payload_bytes = match URL_SAFE_NO_PAD.decode(payload_b64) {
            Ok(bytes) => bytes,
            Err(_) => {
                warn!(
                    "Start token verify failed: base64 decode error prefix={}",
                    preview(payload_b64, 12)
                );
                return None;
            }
        };

        let claims: Claims = match serde_json::from_slice(&payload_bytes) {
            Ok(claims) => claims,
            Err(_) => {
                warn!(
                    "Start token verify failed: malformed claims prefix={}",
                    preview(token, 12)
                );
                return None;
            }
        };

        if claims.ds_id.trim().is_empty()
            || claims.room_id.trim().is_empty()
            || claims.match_id.trim().is_empty()
            || claims.exp.trim().is_empty()
        {
            warn!(
                "Start token verify failed: missing claim fields prefix={}",
                preview(token, 12)
            );
            return None;
        }

        let expires_at = match DateTime::parse_from_rfc3339(&claims.exp) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(_) => {
                warn!(
                    "Start token verify failed: unparseable expiry {}",
                    preview(&claims.exp, 32)
                );
                return None;
            }
        };

        info!(
            "Start token verify success ds={} room={} match={} exp={}",
            mask(&claims.ds_id),
            mask(&claims.room_id),
            mask(&claims.match_id),
            expires_at
        );

        Some(TokenPayload {
            version: header.to_string(),
            server_id: claims.ds_id,
            room_id: claims.room_id,
            match_id: claims.match_id,
            expires_at,
        })
    }

    fn sign(&self, message: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
