//! Player state store.
//!
//! Single source of truth for all known players during a session. The
//! orchestrating client is the only writer; every read hands out an owned
//! clone so callers cannot corrupt the map from outside.

use std::collections::HashMap;

use sync_shared::player::{PlayerId, PlayerState};
use tracing::debug;

/// In-memory map of all known players, local and remote.
#[derive(Default)]
pub struct PlayerStore {
    players: HashMap<PlayerId, PlayerState>,
}

impl PlayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert-or-replace by id.
    ///
    /// A state whose `last_update_ms` is strictly older than the stored one
    /// is silently ignored, guarding against reordered network delivery: a
    /// player's stored state never regresses to an earlier timestamp. Equal
    /// timestamps overwrite (last write wins). Returns whether the state
    /// was applied.
    pub fn upsert(&mut self, state: PlayerState) -> bool {
        if let Some(existing) = self.players.get(&state.id) {
            if state.last_update_ms < existing.last_update_ms {
                debug!(
                    id = %state.id,
                    incoming = state.last_update_ms,
                    stored = existing.last_update_ms,
                    "Dropping stale player update"
                );
                return false;
            }
        }
        self.players.insert(state.id.clone(), state);
        true
    }

    /// Deletes the entry. Removing an unknown id is a no-op, not an error.
    pub fn remove(&mut self, id: &PlayerId) -> Option<PlayerState> {
        self.players.remove(id)
    }

    /// Owned snapshot of one player.
    pub fn get(&self, id: &PlayerId) -> Option<PlayerState> {
        self.players.get(id).cloned()
    }

    /// Owned snapshots of every known player.
    pub fn all(&self) -> Vec<PlayerState> {
        self.players.values().cloned().collect()
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.players.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}
