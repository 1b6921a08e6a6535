//! In-memory broker used by the integration tests.
//!
//! The client side of a `tokio::io::duplex` pipe is handed to
//! `Connection::connect_with_transport`; the test drives the other side
//! through [`MockBroker`].

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use relay_stomp::{Command, ConnectOptions, Connection, Frame, StompCodec, StompItem};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::codec::Framed;

pub struct MockBroker {
    framed: Framed<DuplexStream, StompCodec>,
}

impl MockBroker {
    pub fn new(io: DuplexStream) -> Self {
        Self {
            framed: Framed::new(io, StompCodec::new()),
        }
    }

    /// Next item from the client, `None` once the client closed.
    pub async fn next_item(&mut self) -> Option<StompItem> {
        match tokio::time::timeout(Duration::from_secs(5), self.framed.next()).await {
            Ok(Some(Ok(item))) => Some(item),
            Ok(Some(Err(e))) => panic!("client wrote a malformed frame: {}", e),
            Ok(None) => None,
            Err(_) => panic!("timed out waiting for the client"),
        }
    }

    /// Next frame from the client, skipping heartbeats.
    pub async fn expect_frame(&mut self) -> Frame {
        loop {
            match self.next_item().await {
                Some(StompItem::Frame(f)) => return f,
                Some(StompItem::Heartbeat) => continue,
                None => panic!("client closed while a frame was expected"),
            }
        }
    }

    /// Assert the client writes nothing for a short while.
    pub async fn expect_silence(&mut self) {
        if let Ok(item) = tokio::time::timeout(Duration::from_millis(100), self.framed.next()).await {
            panic!("expected no traffic, got {:?}", item);
        }
    }

    /// Wait until the client closes its side of the pipe.
    pub async fn expect_closed(&mut self) {
        while let Some(item) = self.next_item().await {
            if let StompItem::Frame(f) = item {
                panic!("expected close, got frame {}", f.command);
            }
        }
    }

    pub async fn send(&mut self, frame: Frame) {
        self.framed
            .send(StompItem::Frame(frame))
            .await
            .expect("broker write failed");
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        let io = self.framed.get_mut();
        io.write_all(bytes).await.expect("broker write failed");
        io.flush().await.expect("broker flush failed");
    }

    /// Answer a receipted client frame.
    pub async fn confirm(&mut self, frame: &Frame) {
        let id = frame.get_header("receipt").expect("frame has no receipt header");
        self.send(Frame::new(Command::Receipt).header("receipt-id", id))
            .await;
    }

    /// Deliver a MESSAGE on `subscription`.
    pub async fn message(&mut self, subscription: &str, ack: &str, body: &str) {
        self.send(
            Frame::new(Command::Message)
                .header("subscription", subscription)
                .header("message-id", format!("m-{}", ack))
                .header("ack", ack)
                .header("destination", "/queue/test")
                .set_body(body.as_bytes().to_vec()),
        )
        .await;
    }
}

/// CONNECTED frame for a STOMP 1.2 session with heartbeats off.
pub fn connected_1_2(session: &str) -> Frame {
    Frame::new(Command::Connected)
        .header("version", "1.2")
        .header("session", session)
        .header("server", "mock/1.0")
        .header("heart-beat", "0,0")
}

/// Options with heartbeats off so the pipe only carries frames.
pub fn quiet_options() -> ConnectOptions {
    ConnectOptions::default()
        .login("guest", "guest")
        .heartbeat(0, 0)
}

/// Run a handshake against a fresh mock broker.
///
/// Returns the connection, the broker side and the CONNECT frame the client
/// sent.
pub async fn handshake(options: ConnectOptions, connected: Frame) -> (Connection, MockBroker, Frame) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let mut broker = MockBroker::new(server);
    let connecting = tokio::spawn(Connection::connect_with_transport(client, options));
    let connect = broker.expect_frame().await;
    broker.send(connected).await;
    let conn = connecting
        .await
        .expect("connect task panicked")
        .expect("handshake failed");
    (conn, broker, connect)
}

/// Handshake with [`quiet_options`] and a 1.2 CONNECTED.
pub async fn connected() -> (Connection, MockBroker) {
    let (conn, broker, _) = handshake(quiet_options(), connected_1_2("abc123")).await;
    (conn, broker)
}
