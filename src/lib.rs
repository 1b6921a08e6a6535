//! Async STOMP 1.0/1.1/1.2 client.
//!
//! [`Connection::connect`] performs the handshake and returns a cloneable
//! handle. Subscriptions deliver MESSAGE frames to callbacks (or a
//! [`Subscription`] stream), sends return a [`Receipt`] future, and
//! transactions, ACK/NACK and heartbeats are handled on the connection's
//! background task.
//!
//! The wire layer ([`Frame`], [`StompCodec`], [`codec::encode`],
//! [`codec::decode`]) is usable on its own.

pub mod codec;
pub mod connection;
mod dispatch;
pub mod error;
pub mod frame;
pub mod options;
pub mod parser;
pub mod receipt;
mod session;
pub mod subscription;

pub use codec::{StompCodec, StompItem};
pub use connection::{
    Connection, ConnectionState, DropHandler, ErrorHandler, SessionInfo, negotiate_heartbeats,
    parse_heartbeat_header,
};
pub use dispatch::MessageHandler;
pub use error::{ConnError, MalformedFrame, ServerError};
pub use frame::{Command, Frame};
pub use options::ConnectOptions;
pub use receipt::Receipt;
pub use subscription::{AckMode, Subscription, SubscriptionOptions};
