//! Shared support for the integration tests.

use sync_shared::player::{PlayerId, PlayerState};
use sync_shared::wire::{names, Welcome, WireEvent, WorldSnapshot};

/// Installs a test-friendly tracing subscriber; safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A `welcome` assigning the given id, with the default room capacity.
pub fn welcome(id: &str) -> WireEvent {
    WireEvent::new(
        names::WELCOME,
        &Welcome {
            player_id: PlayerId::from(id),
            max_players: 50,
        },
    )
    .expect("encode welcome")
}

/// A `worldState` snapshot containing the given remote players.
pub fn snapshot(ids: &[&str]) -> WireEvent {
    let players = ids
        .iter()
        .map(|id| PlayerState::new(PlayerId::from(*id), id.to_string()))
        .collect();
    WireEvent::new(names::WORLD_STATE, &WorldSnapshot { players }).expect("encode snapshot")
}

/// A `playerLeft` for the given id.
pub fn player_left(id: &str) -> WireEvent {
    WireEvent::new(names::PLAYER_LEFT, &PlayerId::from(id)).expect("encode playerLeft")
}
