//! `sync_client`
//!
//! Client-side systems for real-time world synchronization:
//! - Channel abstraction (transport-agnostic named events)
//! - Player state store (single source of truth during a session)
//! - Interpolation for remote player poses
//! - Session orchestration and the typed event registry

pub mod channel;
pub mod client;
pub mod events;
pub mod interp;
pub mod store;

pub use client::{SessionState, SyncClient};
