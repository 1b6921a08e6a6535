use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::connection::Connection;
use crate::error::ConnError;
use crate::frame::Frame;

/// Subscription acknowledgement modes as defined by STOMP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// The broker considers a message delivered as soon as it is sent.
    #[default]
    Auto,
    /// Cumulative: acking a message acks everything delivered before it on
    /// the same subscription.
    Client,
    /// Each message is acked or nacked on its own.
    ClientIndividual,
}

impl AckMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckMode::Auto => "auto",
            AckMode::Client => "client",
            AckMode::ClientIndividual => "client-individual",
        }
    }
}

/// Extra settings for a SUBSCRIBE.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionOptions {
    /// Headers forwarded to the broker on SUBSCRIBE (selectors, prefetch,
    /// durable subscription names).
    pub headers: Vec<(String, String)>,
    /// Destination to subscribe to instead of the one passed to `subscribe`.
    pub durable_queue: Option<String>,
    /// Subscription id to use instead of a generated one.
    pub id: Option<String>,
}

impl SubscriptionOptions {
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn durable_queue(mut self, queue: impl Into<String>) -> Self {
        self.durable_queue = Some(queue.into());
        self
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// A stream-shaped subscription returned from
/// [`Connection::subscribe_stream`].
///
/// Yields every MESSAGE delivered to the subscription in wire order and
/// ends when the connection terminates. The `ack`/`nack` helpers delegate
/// to the owning `Connection`.
pub struct Subscription {
    id: String,
    destination: String,
    receiver: mpsc::UnboundedReceiver<Frame>,
    conn: Connection,
}

impl Subscription {
    pub(crate) fn new(
        id: String,
        destination: String,
        receiver: mpsc::UnboundedReceiver<Frame>,
        conn: Connection,
    ) -> Self {
        Self {
            id,
            destination,
            receiver,
            conn,
        }
    }

    /// Returns the subscription id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the destination this subscription listens to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Acknowledge a delivered message by its ack id.
    pub async fn ack(&self, ack_id: &str) -> Result<(), ConnError> {
        self.conn.ack(ack_id).await
    }

    /// Negative-acknowledge a delivered message by its ack id.
    pub async fn nack(&self, ack_id: &str) -> Result<(), ConnError> {
        self.conn.nack(ack_id).await
    }

    /// Unsubscribe and drop whatever was delivered but not yet read.
    pub async fn unsubscribe(self) -> Result<(), ConnError> {
        self.conn.unsubscribe(&self.id).await
    }

    /// Consume the `Subscription` and return the underlying receiver.
    pub fn into_receiver(self) -> mpsc::UnboundedReceiver<Frame> {
        self.receiver
    }
}

impl Stream for Subscription {
    type Item = Frame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
