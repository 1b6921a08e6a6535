use std::fmt;
use thiserror::Error;

use crate::frame::Frame;

/// Reasons a byte sequence is not a valid STOMP frame.
///
/// Any of these on an inbound stream makes the stream unusable: the
/// connection is failed rather than resynchronised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedFrame {
    #[error("missing command line")]
    MissingCommand,
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
    #[error("header line without a colon: {0:?}")]
    HeaderWithoutColon(String),
    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),
    #[error("body does not match content-length {expected}")]
    BodyLengthMismatch { expected: usize },
    #[error("missing NUL terminator")]
    MissingTerminator,
    #[error("unexpected bytes after frame terminator")]
    TrailingBytes,
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    #[error("invalid utf8 in {0}")]
    InvalidUtf8(&'static str),
    #[error("frame exceeds maximum length of {0} bytes")]
    FrameTooLarge(usize),
}

/// An ERROR frame sent by the broker.
///
/// Keeps the commonly inspected parts (`message` header, body text and the
/// `receipt-id` correlation) next to the original frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    /// Value of the `message` header, or `"unknown error"` if absent.
    pub message: String,
    /// Body decoded as UTF-8 (lossily) when non-empty.
    pub body: Option<String>,
    /// `receipt-id` header, set when the error answers a receipted frame.
    pub receipt_id: Option<String>,
    /// The full ERROR frame as received.
    pub frame: Frame,
}

impl ServerError {
    pub fn from_frame(frame: Frame) -> Self {
        let message = frame
            .get_header("message")
            .unwrap_or("unknown error")
            .to_string();
        let body = if frame.body.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&frame.body).into_owned())
        };
        let receipt_id = frame.get_header("receipt-id").map(str::to_string);
        Self {
            message,
            body,
            receipt_id,
            frame,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "STOMP server error: {}", self.message)?;
        if let Some(body) = &self.body {
            write!(f, " ({})", body.trim_end())?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}

/// Errors returned by `Connection` operations.
#[derive(Error, Debug)]
pub enum ConnError {
    /// I/O-level error (connection refused, reset, write failure)
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Protocol-level error
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The inbound stream carried bytes that are not a valid frame
    #[error("malformed frame: {0}")]
    Malformed(#[from] MalformedFrame),
    /// The broker answered CONNECT with an ERROR frame
    #[error("connection rejected: {0}")]
    ServerRejected(ServerError),
    /// The broker sent an ERROR frame after the handshake
    #[error("{0}")]
    Server(ServerError),
    /// No CONNECTED frame arrived within the configured connect timeout
    #[error("timed out waiting for CONNECTED")]
    ConnectTimeout,
    /// Nothing was received within the negotiated heartbeat window
    #[error("heartbeat timeout: no data received for {0} ms")]
    HeartbeatTimeout(u64),
    /// The connection is closed, failed or disconnecting
    #[error("connection closed")]
    ConnectionClosed,
    /// Receipt timeout error
    #[error("receipt timeout: no RECEIPT received for '{0}' within timeout")]
    ReceiptTimeout(String),
    #[error("unknown subscription '{0}'")]
    UnknownSubscription(String),
    #[error("subscription id '{0}' already in use")]
    DuplicateSubscription(String),
    #[error("unknown transaction '{0}'")]
    UnknownTransaction(String),
    #[error("transaction '{0}' already begun")]
    TransactionExists(String),
    #[error("receipt id '{0}' is already pending")]
    DuplicateReceipt(String),
    #[error("session task ended unexpectedly: {0}")]
    SessionAborted(String),
    #[error("unknown ack id '{0}'")]
    UnknownAckId(String),
    #[error("missing required header '{0}'")]
    MissingHeader(&'static str),
}

impl ConnError {
    /// True for errors detected locally, before anything was written.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ConnError::UnknownSubscription(_)
                | ConnError::DuplicateSubscription(_)
                | ConnError::DuplicateReceipt(_)
                | ConnError::UnknownTransaction(_)
                | ConnError::TransactionExists(_)
                | ConnError::UnknownAckId(_)
                | ConnError::MissingHeader(_)
        )
    }
}
