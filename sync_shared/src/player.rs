//! Player state model.
//!
//! One `PlayerState` per participant, local or remote. Timestamps are
//! milliseconds on the client's monotonic session clock, not wall-clock
//! time; they drive the store's monotonic-upsert rule and the interpolation
//! engine, and are passed explicitly so tests stay deterministic.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{Quat, Vec3};

/// Stable per-session identity, assigned by the server on join.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub String);

impl PlayerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlayerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Full replicated state for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: PlayerId,
    pub username: String,
    pub position: Vec3,
    pub rotation: Quat,
    /// Symbolic animation state, last value wins.
    pub animation: String,
    /// Client-receipt time in session-clock milliseconds.
    pub last_update_ms: f64,
}

impl PlayerState {
    /// Fresh state at the world origin in the default animation.
    pub fn new(id: PlayerId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            animation: "idle".to_string(),
            last_update_ms: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_state_defaults() {
        let p = PlayerState::new(PlayerId::from("p1"), "Ada");
        assert_eq!(p.position, Vec3::ZERO);
        assert_eq!(p.rotation, Quat::IDENTITY);
        assert_eq!(p.animation, "idle");
        assert_eq!(p.last_update_ms, 0.0);
    }

    #[test]
    fn player_id_serializes_transparently() {
        let id = PlayerId::from("u1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"u1\"");
    }
}
