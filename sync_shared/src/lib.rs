//! `sync_shared`
//!
//! Shared libraries used by the multiplayer synchronization client and its
//! test harness.
//!
//! Design goals:
//! - Deterministic and modular where practical.
//! - Clear separation of concerns (math, wire, player, chat, config, errors).
//! - Traits for abstraction and dependency injection live in `sync_client`;
//!   this crate holds plain data and pure logic.
//! - No `unsafe`.

pub mod chat;
pub mod config;
pub mod error;
pub mod math;
pub mod player;
pub mod wire;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::error::*;
    pub use crate::math::*;
    pub use crate::player::*;
    pub use crate::wire::*;
}
