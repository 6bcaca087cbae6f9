//! Socket smoke test: the TCP channel against a scripted world server.

use std::time::Duration;

use sync_client::channel::TcpChannel;
use sync_client::{SessionState, SyncClient};
use sync_shared::config::{ClientConfig, OutboundPolicy, ReconnectPolicy};
use sync_shared::math::Vec3;
use sync_shared::player::PlayerId;
use sync_shared::wire::{
    decode_from_bytes, encode_to_bytes, frame, names, JoinRequest, PlayerUpdate, WireEvent,
    PROTOCOL_VERSION,
};
use sync_tests::{init_tracing, snapshot, welcome};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn read_event(stream: &mut TcpStream) -> anyhow::Result<WireEvent> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(decode_from_bytes(&payload)?)
}

async fn write_event(stream: &mut TcpStream, event: &WireEvent) -> anyhow::Result<()> {
    let payload = encode_to_bytes(event)?;
    stream.write_all(&frame(&payload)).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tcp_handshake_and_snapshot() -> anyhow::Result<()> {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // Scripted server: one client, welcome plus an initial snapshot.
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;

        let join = read_event(&mut stream).await?;
        assert_eq!(join.name, names::JOIN);
        let request: JoinRequest = join.decode()?;
        assert_eq!(request.protocol, PROTOCOL_VERSION);
        assert_eq!(request.user_id, "u1");

        write_event(&mut stream, &welcome("u1")).await?;
        write_event(&mut stream, &snapshot(&["p2"])).await?;

        // Hold the socket open until the client is done reading.
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, anyhow::Error>(())
    });

    let cfg = ClientConfig {
        server_addr: addr.to_string(),
        world_id: "w1".to_string(),
        connect_timeout_ms: 1000,
        ..ClientConfig::default()
    };
    let channel = TcpChannel::new(addr.to_string(), Duration::from_millis(1000));
    let mut client = SyncClient::new(cfg, Box::new(channel));

    client.connect("u1", "Ada").await?;
    assert_eq!(client.state(), SessionState::Connected);

    // Give the snapshot a moment to arrive, then drain it.
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.poll().await?;

    assert!(client.player(&PlayerId::from("p2")).is_some());
    assert_eq!(client.players().len(), 2);

    client.disconnect().await;
    server.await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn split_frame_survives_poll_timeouts() -> anyhow::Result<()> {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // Scripted server: a snapshot frame delivered in two TCP writes with a
    // long pause in between, so the client's short-timeout polls fire while
    // only the length prefix and a payload fragment have arrived.
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await?;

        let join = read_event(&mut stream).await?;
        assert_eq!(join.name, names::JOIN);
        write_event(&mut stream, &welcome("u1")).await?;

        let payload = encode_to_bytes(&snapshot(&["p2"]))?;
        let framed = frame(&payload);
        stream.write_all(&framed[..6]).await?;
        stream.flush().await?;
        tokio::time::sleep(Duration::from_millis(100)).await;
        stream.write_all(&framed[6..]).await?;

        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok::<_, anyhow::Error>(())
    });

    let cfg = ClientConfig {
        server_addr: addr.to_string(),
        world_id: "w1".to_string(),
        connect_timeout_ms: 1000,
        ..ClientConfig::default()
    };
    let channel = TcpChannel::new(addr.to_string(), Duration::from_millis(1000));
    let mut client = SyncClient::new(cfg, Box::new(channel));
    client.connect("u1", "Ada").await?;

    // Keep polling across the pause; every poll but the last sees only a
    // partial frame and must leave the stream intact.
    for _ in 0..8 {
        client.poll().await?;
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    assert_eq!(client.state(), SessionState::Connected);
    assert!(client.player(&PlayerId::from("p2")).is_some());

    client.disconnect().await;
    server.await??;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn buffered_sample_replayed_after_reconnect() -> anyhow::Result<()> {
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    // Scripted server: welcomes the client, drops the connection, then
    // welcomes the rejoin and reports the first sample it receives on the
    // new connection.
    let server = tokio::spawn(async move {
        let (mut first, _) = listener.accept().await?;
        let join = read_event(&mut first).await?;
        assert_eq!(join.name, names::JOIN);
        write_event(&mut first, &welcome("u1")).await?;
        drop(first);

        let (mut second, _) = listener.accept().await?;
        let rejoin = read_event(&mut second).await?;
        assert_eq!(rejoin.name, names::JOIN);
        write_event(&mut second, &welcome("u1")).await?;

        let replayed = read_event(&mut second).await?;
        assert_eq!(replayed.name, names::PLAYER_UPDATE);
        let update: PlayerUpdate = replayed.decode()?;

        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, anyhow::Error>(update.position)
    });

    let cfg = ClientConfig {
        server_addr: addr.to_string(),
        world_id: "w1".to_string(),
        connect_timeout_ms: 1000,
        reconnect: ReconnectPolicy {
            enabled: true,
            max_retries: 3,
            outbound: OutboundPolicy::Buffer,
        },
        ..ClientConfig::default()
    };
    let channel = TcpChannel::new(addr.to_string(), Duration::from_millis(1000));
    let mut client = SyncClient::new(cfg, Box::new(channel));
    client.connect("u1", "Ada").await?;

    // Let the server-side drop land, then observe the loss.
    tokio::time::sleep(Duration::from_millis(20)).await;
    client.poll().await?;
    assert_eq!(client.state(), SessionState::Reconnecting);

    // A move during the outage is coalesced and held per the Buffer policy.
    client.update_position(Vec3::new(5.0, 0.0, 0.0));
    client.flush_outbound().await?;

    // The next poll runs the reconnect attempt and replays the held sample.
    client.poll().await?;
    assert_eq!(client.state(), SessionState::Connected);

    let seen = server.await??;
    assert_eq!(seen, Vec3::new(5.0, 0.0, 0.0));

    client.disconnect().await;
    Ok(())
}

#[tokio::test]
async fn tcp_connect_to_unreachable_server_fails_typed() {
    init_tracing();

    // Bind-then-drop guarantees nothing listens on the port.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let addr = format!("127.0.0.1:{port}");
    let cfg = ClientConfig {
        server_addr: addr.clone(),
        world_id: "w1".to_string(),
        connect_timeout_ms: 500,
        ..ClientConfig::default()
    };
    let channel = TcpChannel::new(addr, Duration::from_millis(500));
    let mut client = SyncClient::new(cfg, Box::new(channel));

    let err = client.connect("u1", "Ada").await.unwrap_err();
    assert!(matches!(
        err,
        sync_shared::error::SyncError::Connection(_)
    ));
    assert_eq!(client.state(), SessionState::Disconnected);
}
