//! Error taxonomy.
//!
//! Connection-phase errors surface through `connect()`; mid-session
//! transport failures drive the state machine and an `Error` client event
//! instead of propagating. Malformed inbound payloads (`Validation`) are
//! dropped per-event, never fatal to the session.

use thiserror::Error;

/// Errors produced by the synchronization client and its channels.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Server unreachable or the connection attempt timed out.
    #[error("connection failed: {0}")]
    Connection(String),

    /// Server refused the join (room full, invalid credentials).
    #[error("rejected by server: {0}")]
    Rejected(String),

    /// Mid-session channel failure.
    #[error("transport failure: {0}")]
    Transport(String),

    /// Malformed payload on a named event.
    #[error("invalid payload on '{event}': {reason}")]
    Validation { event: String, reason: String },

    /// Client-side outbound rate limit tripped.
    #[error("rate limited: {0}")]
    RateLimited(String),
}

impl SyncError {
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}
