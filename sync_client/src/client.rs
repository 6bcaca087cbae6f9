//! Multiplayer client implementation.
//!
//! The client maintains:
//! - The injected channel (any transport with named-event semantics)
//! - The player state store (single source of truth during a session)
//! - Per-remote-player interpolation tracks
//! - A typed event registry for UI/hook consumers
//! - Coalesced outbound sampling at the configured tick rate
//!
//! All state mutation happens on the task that drives `connect`/`poll`/
//! `flush_outbound`; readers go through accessor snapshots, so no locking
//! is needed anywhere.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use sync_shared::chat::{ChatMessage, RateLimiter, MAX_MESSAGE_LENGTH};
use sync_shared::config::{ClientConfig, OutboundPolicy};
use sync_shared::error::SyncError;
use sync_shared::math::{Quat, Vec3};
use sync_shared::player::{PlayerId, PlayerState};
use sync_shared::wire::{
    names, ChatBroadcast, JoinRejected, JoinRequest, PlayerUpdate, Welcome, WireEvent,
    WorldSnapshot, PROTOCOL_VERSION,
};
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::events::{ClientEvent, EventKind, EventRegistry, SubscriptionId};
use crate::interp::{Interpolator, Pose};
use crate::store::PlayerStore;

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initial; no channel open.
    Idle,
    /// `connect()` in flight.
    Connecting,
    /// Channel open; inbound events update the store, outbound accepted.
    Connected,
    /// Unexpected channel drop; retrying per the configured policy.
    Reconnecting,
    /// Terminal for the session.
    Disconnected,
}

/// How long one `poll()` waits for a first pending event.
const POLL_TIMEOUT: Duration = Duration::from_millis(5);
/// Inbound events handled per `poll()`, so a network flush cannot starve
/// the render loop.
const POLL_BUDGET: usize = 64;

/// High-level multiplayer synchronization client.
///
/// Owns the session state exclusively; created per session and discarded
/// after `disconnect()` (`create → connect → use → disconnect → discard`).
pub struct SyncClient {
    cfg: ClientConfig,
    channel: Box<dyn Channel>,
    state: SessionState,
    epoch: Instant,

    local_id: Option<PlayerId>,
    user_id: String,
    username: String,
    room_capacity: Option<u32>,

    store: PlayerStore,
    interp: Interpolator,
    registry: EventRegistry,

    /// Events received during the handshake, replayed by the next `poll`.
    inbox: VecDeque<WireEvent>,
    /// Newest wire timestamp seen per remote player; reordered datagrams
    /// carrying older samples are dropped before they touch the store.
    last_wire_ms: HashMap<PlayerId, f64>,

    /// Local transform changed since the last flush.
    outbound_dirty: bool,
    last_flush_ms: f64,
    last_world_emit_ms: f64,
    /// Coalesced samples held back while reconnecting (Buffer policy).
    held_outbound: Vec<WireEvent>,

    chat_limiter: RateLimiter,
    retries_left: u32,
}

impl SyncClient {
    /// Builds a client around an injected channel. Performs no I/O and
    /// never fails; all failure surfaces through `connect()` and `poll()`.
    pub fn new(cfg: ClientConfig, channel: Box<dyn Channel>) -> Self {
        let interp = Interpolator::new(cfg.tick_hz);
        let retries = cfg.reconnect.max_retries;
        Self {
            cfg,
            channel,
            state: SessionState::Idle,
            epoch: Instant::now(),
            local_id: None,
            user_id: String::new(),
            username: String::new(),
            room_capacity: None,
            store: PlayerStore::new(),
            interp,
            registry: EventRegistry::new(),
            inbox: VecDeque::new(),
            last_wire_ms: HashMap::new(),
            outbound_dirty: false,
            last_flush_ms: f64::NEG_INFINITY,
            last_world_emit_ms: f64::NEG_INFINITY,
            held_outbound: Vec::new(),
            chat_limiter: RateLimiter::default(),
            retries_left: retries,
        }
    }

    /// Milliseconds elapsed on the session clock.
    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }

    // ─── Lifecycle ───

    /// Connects to the configured world and performs the join handshake.
    ///
    /// Exactly one attempt per client: calling again while `Connecting` or
    /// `Connected` rejects immediately, and a `Disconnected` client is not
    /// reusable. On success, `playerJoined` fires for every existing remote
    /// player once the initial world snapshot is processed by `poll()`.
    pub async fn connect(&mut self, user_id: &str, username: &str) -> Result<(), SyncError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::Disconnected => {
                return Err(SyncError::connection(
                    "session is terminal; create a new client",
                ))
            }
            _ => return Err(SyncError::connection("connection attempt already active")),
        }

        self.state = SessionState::Connecting;
        self.user_id = user_id.to_string();
        self.username = username.to_string();

        info!(world = %self.cfg.world_id, user = %user_id, "Connecting");
        let deadline = Instant::now() + Duration::from_millis(self.cfg.connect_timeout_ms);

        match self.join_handshake(deadline).await {
            Ok(welcome) => {
                self.adopt_identity(welcome);
                self.state = SessionState::Connected;
                self.retries_left = self.cfg.reconnect.max_retries;
                info!(player_id = ?self.local_id, "Connected");
                Ok(())
            }
            Err(e) => {
                // Nothing was inserted into the store before the welcome,
                // so a failed attempt leaves no half-connected state.
                self.channel.disconnect();
                self.state = SessionState::Disconnected;
                Err(e)
            }
        }
    }

    async fn join_handshake(&mut self, deadline: Instant) -> Result<Welcome, SyncError> {
        self.channel.connect(&self.cfg.world_id).await?;

        let join = WireEvent::new(
            names::JOIN,
            &JoinRequest {
                user_id: self.user_id.clone(),
                username: self.username.clone(),
                protocol: PROTOCOL_VERSION,
            },
        )?;
        self.channel.send(join).await?;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(SyncError::Connection(format!(
                    "no welcome within {}ms",
                    self.cfg.connect_timeout_ms
                )));
            }

            let Some(event) = self.channel.recv_timeout(remaining).await? else {
                continue;
            };
            match event.name.as_str() {
                names::WELCOME => match event.decode::<Welcome>() {
                    Ok(welcome) => return Ok(welcome),
                    Err(e) => warn!(error = %e, "Dropping malformed welcome"),
                },
                names::JOIN_REJECTED => {
                    let reason = event
                        .decode::<JoinRejected>()
                        .map(|r| r.reason)
                        .unwrap_or_else(|_| "unspecified".to_string());
                    return Err(SyncError::Rejected(reason));
                }
                _ => {
                    // World traffic racing the welcome; replay it in poll().
                    self.inbox.push_back(event);
                }
            }
        }
    }

    fn adopt_identity(&mut self, welcome: Welcome) {
        if welcome.max_players != self.cfg.max_players {
            // The server's capacity wins; the configured value only sizes
            // expectations client-side.
            warn!(
                configured = self.cfg.max_players,
                server = welcome.max_players,
                "Room capacity differs from configuration"
            );
        }
        self.room_capacity = Some(welcome.max_players);
        let assigned = welcome.player_id;

        if self.local_id.as_ref() != Some(&assigned) {
            // Rejoin may hand out a fresh id; carry the local entry over.
            if let Some(old) = self.local_id.take() {
                if let Some(mut local) = self.store.remove(&old) {
                    local.id = assigned.clone();
                    self.store.upsert(local);
                }
            }
            self.local_id = Some(assigned.clone());
        }

        if !self.store.contains(&assigned) {
            let mut local = PlayerState::new(assigned, self.username.clone());
            local.last_update_ms = self.now_ms();
            self.store.upsert(local);
        }
    }

    /// Tears the session down. Idempotent; always succeeds. Emits
    /// `Disconnected` exactly once per session.
    pub async fn disconnect(&mut self) {
        match self.state {
            SessionState::Disconnected => return,
            SessionState::Idle => {
                self.state = SessionState::Disconnected;
                return;
            }
            _ => {}
        }

        if self.state == SessionState::Connected && self.channel.is_open() {
            // Best effort; the server notices the close either way.
            if let Ok(event) = WireEvent::new(names::LEAVE, &serde_json::json!({})) {
                let _ = self.channel.send(event).await;
            }
        }
        self.finalize_disconnect();
    }

    fn finalize_disconnect(&mut self) {
        self.channel.disconnect();
        self.store.clear();
        self.interp.clear();
        self.inbox.clear();
        self.last_wire_ms.clear();
        self.held_outbound.clear();
        self.outbound_dirty = false;
        self.state = SessionState::Disconnected;
        info!("Disconnected");
        self.registry.emit(&ClientEvent::Disconnected);
    }

    // ─── Outbound operations ───

    /// Moves the local player. Applied to the store immediately (local
    /// state is authoritative for the local player); the outbound send is
    /// coalesced to one sample per tick interval, latest value wins.
    pub fn update_position(&mut self, position: Vec3) {
        self.update_local(|p| p.position = position);
    }

    /// Rotates the local player; same echo and coalescing rules.
    pub fn update_rotation(&mut self, rotation: Quat) {
        self.update_local(|p| p.rotation = rotation);
    }

    /// Switches the local player's animation; same echo and coalescing
    /// rules, last value wins.
    pub fn update_animation(&mut self, animation: &str) {
        let animation = animation.to_string();
        self.update_local(|p| p.animation = animation);
    }

    fn update_local(&mut self, apply: impl FnOnce(&mut PlayerState)) {
        if !matches!(
            self.state,
            SessionState::Connected | SessionState::Reconnecting
        ) {
            return;
        }
        let Some(id) = self.local_id.clone() else {
            return;
        };
        let Some(mut local) = self.store.get(&id) else {
            return;
        };
        apply(&mut local);
        local.last_update_ms = self.now_ms();
        self.store.upsert(local);
        self.outbound_dirty = true;
    }

    /// Sends a chat message immediately: no coalescing and no local echo —
    /// the server broadcasts to all participants including the sender.
    pub async fn send_chat(&mut self, body: &str) -> Result<(), SyncError> {
        if self.state != SessionState::Connected {
            return Err(SyncError::transport("not connected"));
        }
        if body.len() > MAX_MESSAGE_LENGTH {
            return Err(SyncError::Validation {
                event: names::CHAT.to_string(),
                reason: format!("message exceeds {MAX_MESSAGE_LENGTH} bytes"),
            });
        }
        if !self.chat_limiter.allow() {
            return Err(SyncError::RateLimited(format!(
                "{} remaining in window",
                self.chat_limiter.remaining()
            )));
        }

        let Some(local) = self.local_player() else {
            return Err(SyncError::transport("no local identity"));
        };
        let event = WireEvent::new(
            names::CHAT,
            &ChatBroadcast {
                sender_id: local.id,
                sender_name: local.username,
                body: body.to_string(),
                timestamp_ms: self.now_ms(),
            },
        )?;
        if let Err(e) = self.channel.send(event).await {
            self.on_transport_loss(&e.to_string());
            return Err(e);
        }
        Ok(())
    }

    /// Sends the coalesced local sample if a tick interval elapsed since
    /// the last flush. While `Reconnecting`, samples are buffered or
    /// dropped per the configured outbound policy.
    pub async fn flush_outbound(&mut self) -> Result<(), SyncError> {
        if !self.outbound_dirty {
            return Ok(());
        }
        let now = self.now_ms();
        if now - self.last_flush_ms < self.cfg.tick_interval_ms() {
            return Ok(());
        }
        let Some(local) = self.local_player() else {
            return Ok(());
        };

        let event = WireEvent::new(
            names::PLAYER_UPDATE,
            &PlayerUpdate {
                id: local.id,
                position: local.position,
                rotation: local.rotation,
                animation: local.animation,
                timestamp_ms: now,
            },
        )?;

        match self.state {
            SessionState::Connected => {
                match self.channel.send(event).await {
                    Ok(()) => {
                        self.outbound_dirty = false;
                        self.last_flush_ms = now;
                    }
                    Err(SyncError::Transport(msg)) => {
                        // Mid-session loss drives the state machine, it is
                        // not an error thrown at the render loop.
                        self.on_transport_loss(&msg);
                    }
                    Err(e) => return Err(e),
                }
                Ok(())
            }
            SessionState::Reconnecting => {
                match self.cfg.reconnect.outbound {
                    OutboundPolicy::Buffer => self.held_outbound.push(event),
                    OutboundPolicy::Drop => {}
                }
                self.outbound_dirty = false;
                self.last_flush_ms = now;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    // ─── Inbound processing ───

    /// Drains pending inbound events and dispatches them into the store,
    /// the interpolator, and the event registry. Cheap when idle; call it
    /// every render tick.
    pub async fn poll(&mut self) -> Result<(), SyncError> {
        match self.state {
            SessionState::Connected => {}
            SessionState::Reconnecting => return self.try_reconnect().await,
            _ => return Ok(()),
        }

        for _ in 0..POLL_BUDGET {
            if let Some(event) = self.inbox.pop_front() {
                self.dispatch(event);
                continue;
            }
            match self.channel.recv_timeout(POLL_TIMEOUT).await {
                Ok(Some(event)) => self.dispatch(event),
                Ok(None) => break,
                Err(SyncError::Transport(msg)) => {
                    self.on_transport_loss(&msg);
                    break;
                }
                Err(e @ SyncError::Validation { .. }) => {
                    // One undecodable frame is not a session failure.
                    warn!(error = %e, "Dropping undecodable frame");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Convenience per-frame driver: inbound poll plus outbound flush.
    pub async fn run_tick(&mut self) -> Result<(), SyncError> {
        self.poll().await?;
        self.flush_outbound().await
    }

    fn dispatch(&mut self, event: WireEvent) {
        match event.name.as_str() {
            names::WORLD_STATE => match event.decode::<WorldSnapshot>() {
                Ok(snap) => self.apply_snapshot(snap),
                Err(e) => warn!(error = %e, "Dropping malformed world snapshot"),
            },
            names::PLAYER_JOINED => match event.decode::<PlayerState>() {
                Ok(state) => self.apply_joined(state),
                Err(e) => warn!(error = %e, "Dropping malformed join"),
            },
            names::PLAYER_LEFT => match event.decode::<PlayerId>() {
                Ok(id) => self.apply_left(&id),
                Err(e) => warn!(error = %e, "Dropping malformed leave"),
            },
            names::PLAYER_UPDATE => match event.decode::<PlayerUpdate>() {
                Ok(update) => self.apply_update(update),
                Err(e) => warn!(error = %e, "Dropping malformed player update"),
            },
            names::CHAT => match event.decode::<ChatBroadcast>() {
                Ok(chat) => self.apply_chat(chat),
                Err(e) => warn!(error = %e, "Dropping malformed chat"),
            },
            names::SERVER_DISCONNECT => {
                info!("Server closed the session");
                self.finalize_disconnect();
            }
            other => debug!(event = %other, "Unhandled inbound event"),
        }
    }

    fn is_local(&self, id: &PlayerId) -> bool {
        self.local_id.as_ref() == Some(id)
    }

    fn apply_snapshot(&mut self, snap: WorldSnapshot) {
        let now = self.now_ms();
        for mut state in snap.players {
            // The local player is authoritative locally; remote echoes of
            // it never overwrite or duplicate the local entry.
            if self.is_local(&state.id) {
                continue;
            }
            let known = self.store.contains(&state.id);
            state.last_update_ms = now;
            self.interp
                .push(&state.id, state.position, state.rotation, now);
            let joined = self.store.upsert(state.clone()) && !known;
            if joined {
                self.registry.emit(&ClientEvent::PlayerJoined(state));
            }
        }
        self.last_world_emit_ms = now;
        self.registry.emit(&ClientEvent::WorldStateUpdate);
    }

    fn apply_joined(&mut self, mut state: PlayerState) {
        if self.is_local(&state.id) {
            return;
        }
        let known = self.store.contains(&state.id);
        let now = self.now_ms();
        state.last_update_ms = now;
        self.interp
            .push(&state.id, state.position, state.rotation, now);
        self.store.upsert(state.clone());
        if !known {
            self.registry.emit(&ClientEvent::PlayerJoined(state));
        }
    }

    fn apply_left(&mut self, id: &PlayerId) {
        // The local entry is never removed by remote events.
        if self.is_local(id) {
            return;
        }
        if self.store.remove(id).is_some() {
            self.interp.remove(id);
            self.last_wire_ms.remove(id);
            self.registry.emit(&ClientEvent::PlayerLeft(id.clone()));
        }
    }

    fn apply_update(&mut self, update: PlayerUpdate) {
        if self.is_local(&update.id) {
            // Remote confirmation of our own state; local echo already
            // holds the newest value under the same monotonic rule.
            return;
        }
        // Sender timestamps order samples from one peer; receipt times
        // cannot, since a reordered datagram still arrives "later".
        if let Some(&seen) = self.last_wire_ms.get(&update.id) {
            if update.timestamp_ms < seen {
                debug!(id = %update.id, "Dropping reordered sample");
                return;
            }
        }
        self.last_wire_ms
            .insert(update.id.clone(), update.timestamp_ms);

        let now = self.now_ms();
        let mut state = match self.store.get(&update.id) {
            Some(state) => state,
            // First contact without a join event; synthesize the entry.
            None => PlayerState::new(update.id.clone(), update.id.as_str()),
        };
        let known = self.store.contains(&update.id);
        state.position = update.position;
        state.rotation = update.rotation;
        state.animation = update.animation;
        state.last_update_ms = now;

        self.interp
            .push(&update.id, update.position, update.rotation, now);
        self.store.upsert(state.clone());
        if !known {
            self.registry.emit(&ClientEvent::PlayerJoined(state));
        }

        // Transform updates are cheap; consumers get one worldStateUpdate
        // per tick interval, not one per field.
        if now - self.last_world_emit_ms >= self.cfg.tick_interval_ms() {
            self.last_world_emit_ms = now;
            self.registry.emit(&ClientEvent::WorldStateUpdate);
        }
    }

    fn apply_chat(&mut self, chat: ChatBroadcast) {
        let message = ChatMessage {
            sender_id: chat.sender_id,
            sender_name: chat.sender_name,
            body: chat.body,
            timestamp_ms: self.now_ms(),
        };
        self.registry.emit(&ClientEvent::Chat(message));
    }

    // ─── Resilience ───

    fn on_transport_loss(&mut self, reason: &str) {
        warn!(reason = %reason, "Transport loss");
        self.registry.emit(&ClientEvent::Error(reason.to_string()));
        if self.cfg.reconnect.enabled && self.retries_left > 0 {
            self.channel.disconnect();
            self.state = SessionState::Reconnecting;
        } else {
            self.finalize_disconnect();
        }
    }

    async fn try_reconnect(&mut self) -> Result<(), SyncError> {
        if self.retries_left == 0 {
            self.finalize_disconnect();
            return Ok(());
        }
        self.retries_left -= 1;
        info!(remaining = self.retries_left, "Reconnect attempt");

        let deadline = Instant::now() + Duration::from_millis(self.cfg.connect_timeout_ms);
        match self.join_handshake(deadline).await {
            Ok(welcome) => {
                self.adopt_identity(welcome);
                self.state = SessionState::Connected;
                self.retries_left = self.cfg.reconnect.max_retries;
                info!("Reconnected");
                self.replay_held().await;
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "Reconnect attempt failed");
                self.channel.disconnect();
                if self.retries_left == 0 {
                    self.finalize_disconnect();
                }
                Ok(())
            }
        }
    }

    async fn replay_held(&mut self) {
        for event in std::mem::take(&mut self.held_outbound) {
            if let Err(e) = self.channel.send(event).await {
                self.on_transport_loss(&e.to_string());
                return;
            }
        }
    }

    // ─── Reads ───

    /// Owned snapshots of every known player, local included.
    pub fn players(&self) -> Vec<PlayerState> {
        self.store.all()
    }

    /// Owned snapshot of one player.
    pub fn player(&self, id: &PlayerId) -> Option<PlayerState> {
        self.store.get(id)
    }

    /// Owned snapshot of the local player.
    pub fn local_player(&self) -> Option<PlayerState> {
        self.local_id.as_ref().and_then(|id| self.store.get(id))
    }

    pub fn local_id(&self) -> Option<&PlayerId> {
        self.local_id.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Capacity advertised by the server's welcome, once connected.
    pub fn room_capacity(&self) -> Option<u32> {
        self.room_capacity
    }

    /// Render-ready pose at an explicit session time.
    ///
    /// The local player and any player with interpolation disabled read
    /// straight from the store; remote players go through the smoother.
    pub fn render_pose_at(&self, id: &PlayerId, now_ms: f64) -> Option<Pose> {
        if self.cfg.interpolation && !self.is_local(id) {
            if let Some(pose) = self.interp.sample(id, now_ms) {
                return Some(pose);
            }
        }
        self.store.get(id).map(|p| Pose {
            position: p.position,
            rotation: p.rotation,
        })
    }

    /// Render-ready pose at the current session time.
    pub fn render_pose(&self, id: &PlayerId) -> Option<Pose> {
        self.render_pose_at(id, self.now_ms())
    }

    // ─── Event subscription ───

    /// Subscribes a handler; fan-out is synchronous, in subscription order.
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&ClientEvent) + Send + 'static,
    {
        self.registry.on(kind, handler)
    }

    /// Unsubscribes a handler.
    pub fn off(&mut self, id: SubscriptionId) -> bool {
        self.registry.off(id)
    }
}
