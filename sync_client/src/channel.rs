//! Channel abstraction.
//!
//! A transport-agnostic bidirectional named-event connection. The client
//! core only assumes connect/disconnect/send/receive semantics over
//! `WireEvent`s; the concrete wire protocol is a pluggable collaborator
//! injected at construction time.
//!
//! Inbound events surface through a polled `recv_timeout` stream rather
//! than per-event callbacks; named-event fan-out to consumers lives in the
//! client's event registry.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use sync_shared::error::SyncError;
use sync_shared::wire::{decode_from_bytes, encode_to_bytes, frame, WireEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time;
use tracing::debug;

/// Frames larger than this are treated as a transport fault.
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Bidirectional named-event connection to a shared-world server.
#[async_trait]
pub trait Channel: Send {
    /// Opens the connection to a room. Fails with `SyncError::Connection`
    /// if the server is unreachable within the implementation's bound.
    async fn connect(&mut self, room_id: &str) -> Result<(), SyncError>;

    /// Closes the connection. Idempotent; always succeeds.
    fn disconnect(&mut self);

    /// Fire-and-forget send; no delivery guarantee, ordering not guaranteed
    /// across distinct event names. Errors only on a closed/failed channel.
    async fn send(&mut self, event: WireEvent) -> Result<(), SyncError>;

    /// Receives the next inbound event, or `None` when nothing arrives
    /// within the timeout. A transport fault yields `SyncError::Transport`.
    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WireEvent>, SyncError>;

    fn is_open(&self) -> bool;
}

/// Channel over TCP with length-prefixed JSON frames.
pub struct TcpChannel {
    addr: String,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
    /// Partial inbound frames accumulate here across polls.
    rx_buf: BytesMut,
}

impl TcpChannel {
    /// `addr` is the server address (`host:port`); room routing happens in
    /// the join handshake, not at the socket layer.
    pub fn new(addr: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout,
            stream: None,
            rx_buf: BytesMut::new(),
        }
    }
}

/// Parses one complete frame out of the buffer, leaving partial data in
/// place for the next read.
fn take_frame(buf: &mut BytesMut) -> Result<Option<WireEvent>, SyncError> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(SyncError::Transport(format!("oversized frame: {len} bytes")));
    }
    if buf.len() < 4 + len {
        return Ok(None);
    }
    buf.advance(4);
    let payload = buf.split_to(len);
    decode_from_bytes(&payload).map(Some)
}

#[async_trait]
impl Channel for TcpChannel {
    async fn connect(&mut self, room_id: &str) -> Result<(), SyncError> {
        debug!(addr = %self.addr, room = %room_id, "Opening TCP channel");
        match time::timeout(self.connect_timeout, TcpStream::connect(&self.addr)).await {
            Ok(Ok(stream)) => {
                self.rx_buf.clear();
                self.stream = Some(stream);
                Ok(())
            }
            Ok(Err(e)) => Err(SyncError::Connection(format!(
                "tcp connect {}: {e}",
                self.addr
            ))),
            Err(_) => Err(SyncError::Connection(format!(
                "tcp connect {}: timed out after {:?}",
                self.addr, self.connect_timeout
            ))),
        }
    }

    fn disconnect(&mut self) {
        self.stream = None;
        self.rx_buf.clear();
    }

    async fn send(&mut self, event: WireEvent) -> Result<(), SyncError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SyncError::transport("channel closed"))?;
        let payload = encode_to_bytes(&event)?;
        let framed = frame(&payload);
        stream
            .write_all(&framed)
            .await
            .map_err(|e| SyncError::Transport(format!("tcp write: {e}")))
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WireEvent>, SyncError> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| SyncError::transport("channel closed"))?;
        loop {
            if let Some(event) = take_frame(&mut self.rx_buf)? {
                return Ok(Some(event));
            }
            // read_buf appends whatever arrived and is cancellation safe:
            // a timeout mid-frame leaves the consumed bytes buffered, so
            // the stream never desynchronizes on a slow frame.
            match time::timeout(timeout, stream.read_buf(&mut self.rx_buf)).await {
                Ok(Ok(0)) => return Err(SyncError::transport("connection closed by peer")),
                Ok(Ok(_)) => {}
                Ok(Err(e)) => return Err(SyncError::Transport(format!("tcp read: {e}"))),
                Err(_) => return Ok(None),
            }
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

/// In-process channel half, paired with a [`LoopbackPeer`].
///
/// Used by tests and embeddings that script the server side directly.
pub struct LoopbackChannel {
    to_peer: mpsc::UnboundedSender<WireEvent>,
    from_peer: mpsc::UnboundedReceiver<WireEvent>,
    open: bool,
}

/// The scripted "server" end of a loopback pair.
pub struct LoopbackPeer {
    to_client: mpsc::UnboundedSender<WireEvent>,
    from_client: mpsc::UnboundedReceiver<WireEvent>,
}

/// Creates a connected loopback pair.
pub fn loopback_pair() -> (LoopbackChannel, LoopbackPeer) {
    let (to_peer, from_client) = mpsc::unbounded_channel();
    let (to_client, from_peer) = mpsc::unbounded_channel();
    (
        LoopbackChannel {
            to_peer,
            from_peer,
            open: false,
        },
        LoopbackPeer {
            to_client,
            from_client,
        },
    )
}

impl LoopbackPeer {
    /// Pushes an event toward the client. Returns false once the client
    /// half is gone.
    pub fn send(&self, event: WireEvent) -> bool {
        self.to_client.send(event).is_ok()
    }

    /// Dropping the sender simulates a mid-session transport loss on the
    /// client half.
    pub fn sever(self) {
        drop(self.to_client);
    }

    pub fn try_recv(&mut self) -> Option<WireEvent> {
        self.from_client.try_recv().ok()
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<WireEvent> {
        time::timeout(timeout, self.from_client.recv())
            .await
            .ok()
            .flatten()
    }
}

#[async_trait]
impl Channel for LoopbackChannel {
    async fn connect(&mut self, room_id: &str) -> Result<(), SyncError> {
        debug!(room = %room_id, "Opening loopback channel");
        self.open = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.open = false;
    }

    async fn send(&mut self, event: WireEvent) -> Result<(), SyncError> {
        if !self.open {
            return Err(SyncError::transport("channel closed"));
        }
        self.to_peer
            .send(event)
            .map_err(|_| SyncError::transport("peer gone"))
    }

    async fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WireEvent>, SyncError> {
        if !self.open {
            return Err(SyncError::transport("channel closed"));
        }
        match time::timeout(timeout, self.from_peer.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(SyncError::transport("peer gone")),
            Err(_) => Ok(None),
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_shared::wire::names;

    fn chat_event() -> WireEvent {
        WireEvent {
            name: names::CHAT.to_string(),
            payload: serde_json::json!({ "body": "hi" }),
        }
    }

    #[tokio::test]
    async fn loopback_roundtrip() {
        let (mut channel, mut peer) = loopback_pair();
        channel.connect("w1").await.unwrap();

        channel.send(chat_event()).await.unwrap();
        let at_peer = peer.recv_timeout(Duration::from_millis(50)).await.unwrap();
        assert_eq!(at_peer.name, names::CHAT);

        assert!(peer.send(chat_event()));
        let at_client = channel
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(at_client.name, names::CHAT);
    }

    #[tokio::test]
    async fn closed_channel_refuses_io() {
        let (mut channel, _peer) = loopback_pair();
        let err = channel.send(chat_event()).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[tokio::test]
    async fn recv_times_out_as_none() {
        let (mut channel, _peer) = loopback_pair();
        channel.connect("w1").await.unwrap();
        let got = channel.recv_timeout(Duration::from_millis(10)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn severed_peer_is_a_transport_fault() {
        let (mut channel, peer) = loopback_pair();
        channel.connect("w1").await.unwrap();
        peer.sever();
        let err = channel
            .recv_timeout(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport(_)));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let (mut channel, _peer) = loopback_pair();
        channel.connect("w1").await.unwrap();
        channel.disconnect();
        channel.disconnect();
        assert!(!channel.is_open());
    }
}
