//! Client event registry.
//!
//! An explicit typed subscription registry: event kind -> ordered list of
//! handlers, owned by the client and decoupled from any UI framework's
//! reactivity. Handlers run synchronously, in registration order, on the
//! task that polls the client.

use std::collections::HashMap;

use sync_shared::chat::ChatMessage;
use sync_shared::player::{PlayerId, PlayerState};

/// Events the client fans out to consumers.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A remote player entered the world (also emitted per existing player
    /// when the initial snapshot arrives).
    PlayerJoined(PlayerState),
    /// A remote player left; carries the removed id.
    PlayerLeft(PlayerId),
    /// Player transforms changed; read snapshots through the accessors.
    WorldStateUpdate,
    /// A chat message was received.
    Chat(ChatMessage),
    /// A recoverable mid-session failure, for the consumer to render.
    Error(String),
    /// The session ended. Emitted exactly once per session.
    Disconnected,
}

/// Discriminant used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PlayerJoined,
    PlayerLeft,
    WorldStateUpdate,
    Chat,
    Error,
    Disconnected,
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::PlayerJoined(_) => EventKind::PlayerJoined,
            ClientEvent::PlayerLeft(_) => EventKind::PlayerLeft,
            ClientEvent::WorldStateUpdate => EventKind::WorldStateUpdate,
            ClientEvent::Chat(_) => EventKind::Chat,
            ClientEvent::Error(_) => EventKind::Error,
            ClientEvent::Disconnected => EventKind::Disconnected,
        }
    }
}

/// Handle returned by `on`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&ClientEvent) + Send>;

/// Event kind -> ordered handler list.
#[derive(Default)]
pub struct EventRegistry {
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
    next_id: u64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler. Multiple handlers per kind are permitted;
    /// invocation order is registration order.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&ClientEvent) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Unregisters a handler. Returns whether it was found.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        for list in self.handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(sid, _)| *sid == id) {
                drop(list.remove(pos));
                return true;
            }
        }
        false
    }

    /// Fans the event out to every handler subscribed to its kind.
    pub fn emit(&mut self, event: &ClientEvent) {
        if let Some(list) = self.handlers.get_mut(&event.kind()) {
            for (_, handler) in list.iter_mut() {
                handler(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn handlers_run_in_registration_order() {
        let mut registry = EventRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.on(EventKind::Disconnected, move |_| {
                order.lock().unwrap().push(tag);
            });
        }

        registry.emit(&ClientEvent::Disconnected);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn off_unsubscribes() {
        let mut registry = EventRegistry::new();
        let count = Arc::new(Mutex::new(0));

        let c = Arc::clone(&count);
        let sub = registry.on(EventKind::Disconnected, move |_| {
            *c.lock().unwrap() += 1;
        });

        registry.emit(&ClientEvent::Disconnected);
        assert!(registry.off(sub));
        assert!(!registry.off(sub));
        registry.emit(&ClientEvent::Disconnected);

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn emit_only_reaches_matching_kind() {
        let mut registry = EventRegistry::new();
        let hits = Arc::new(Mutex::new(0));

        let h = Arc::clone(&hits);
        registry.on(EventKind::PlayerLeft, move |event| {
            assert!(matches!(event, ClientEvent::PlayerLeft(_)));
            *h.lock().unwrap() += 1;
        });

        registry.emit(&ClientEvent::Disconnected);
        registry.emit(&ClientEvent::PlayerLeft(PlayerId::from("p2")));

        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
