//! Wire events.
//!
//! Goals:
//! - Express everything crossing a channel as a named event plus a JSON
//!   payload, so the client stays portable across transports.
//! - Keep serialization explicit and versionable.
//!
//! The concrete framing (length prefixes, datagrams, websocket messages) is
//! the channel implementation's business; this module only defines the
//! event envelope, the typed payloads, and byte codec helpers.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::SyncError;
use crate::math::{Quat, Vec3};
use crate::player::{PlayerId, PlayerState};

/// Protocol version for compatibility checks during the join handshake.
pub const PROTOCOL_VERSION: u32 = 1;

/// Well-known event names.
pub mod names {
    /// Client -> server: join request (handshake).
    pub const JOIN: &str = "join";
    /// Server -> client: join accepted, carries the assigned player id.
    pub const WELCOME: &str = "welcome";
    /// Server -> client: join refused (room full, bad credentials).
    pub const JOIN_REJECTED: &str = "joinRejected";
    /// Server -> client: full world snapshot at the tick cadence.
    pub const WORLD_STATE: &str = "worldState";
    /// Server -> client: a remote player entered the world.
    pub const PLAYER_JOINED: &str = "playerJoined";
    /// Server -> client: a remote player left the world.
    pub const PLAYER_LEFT: &str = "playerLeft";
    /// Both directions: one player's transform/animation sample.
    pub const PLAYER_UPDATE: &str = "playerUpdate";
    /// Both directions: chat broadcast.
    pub const CHAT: &str = "chat";
    /// Client -> server: graceful leave notification.
    pub const LEAVE: &str = "leave";
    /// Server -> client: session terminated by the server.
    pub const SERVER_DISCONNECT: &str = "serverDisconnect";
}

/// A named event plus its JSON payload, as it crosses any channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub name: String,
    pub payload: serde_json::Value,
}

impl WireEvent {
    /// Builds an event from a typed payload.
    pub fn new<T: Serialize>(name: &str, payload: &T) -> Result<Self, SyncError> {
        let payload = serde_json::to_value(payload).map_err(|e| SyncError::Validation {
            event: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            payload,
        })
    }

    /// Decodes the payload into a typed struct.
    ///
    /// A failure here means the peer sent a malformed payload; callers drop
    /// the event rather than tearing down the session.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SyncError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| SyncError::Validation {
            event: self.name.clone(),
            reason: e.to_string(),
        })
    }
}

// ─── Handshake payloads ───

/// Client -> server join request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub user_id: String,
    pub username: String,
    pub protocol: u32,
}

/// Server -> client join acceptance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub player_id: PlayerId,
    pub max_players: u32,
}

/// Server -> client join refusal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRejected {
    pub reason: String,
}

// ─── Replication payloads ───

/// Full world snapshot: every player the server currently knows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub players: Vec<PlayerState>,
}

/// One player's transform and animation sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerUpdate {
    pub id: PlayerId,
    pub position: Vec3,
    pub rotation: Quat,
    pub animation: String,
    /// Sender-side timestamp in its own session-clock milliseconds.
    /// The receiver re-stamps with its own clock on receipt.
    pub timestamp_ms: f64,
}

// ─── Chat payload ───

/// Chat broadcast; the server echoes it to all participants, sender included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBroadcast {
    pub sender_id: PlayerId,
    pub sender_name: String,
    pub body: String,
    pub timestamp_ms: f64,
}

// ─── Byte codec helpers ───

/// Serializes a wire event to a JSON byte payload.
pub fn encode_to_bytes(event: &WireEvent) -> Result<Bytes, SyncError> {
    let payload = serde_json::to_vec(event).map_err(|e| SyncError::Validation {
        event: event.name.clone(),
        reason: e.to_string(),
    })?;
    Ok(Bytes::from(payload))
}

/// Deserializes a wire event from a JSON byte payload.
pub fn decode_from_bytes(b: &[u8]) -> Result<WireEvent, SyncError> {
    serde_json::from_slice(b).map_err(|e| SyncError::Validation {
        event: "<frame>".to_string(),
        reason: e.to_string(),
    })
}

/// Prepends a u32 big-endian length prefix, for stream transports.
pub fn frame(payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(payload.len() as u32);
    buf.extend_from_slice(payload);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_event_roundtrip_bytes() {
        let join = WireEvent::new(
            names::JOIN,
            &JoinRequest {
                user_id: "u1".into(),
                username: "Ada".into(),
                protocol: PROTOCOL_VERSION,
            },
        )
        .unwrap();
        let bytes = encode_to_bytes(&join).unwrap();
        let back = decode_from_bytes(&bytes).unwrap();
        assert_eq!(join, back);
        let req: JoinRequest = back.decode().unwrap();
        assert_eq!(req.user_id, "u1");
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let bogus = WireEvent {
            name: names::WELCOME.to_string(),
            payload: serde_json::json!({ "unexpected": true }),
        };
        let err = bogus.decode::<Welcome>().unwrap_err();
        assert!(matches!(err, SyncError::Validation { .. }));
    }

    #[test]
    fn frame_prefixes_length() {
        let framed = frame(b"abc");
        assert_eq!(&framed[..4], &3u32.to_be_bytes());
        assert_eq!(&framed[4..], b"abc");
    }
}
