use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::codec::{StompCodec, StompItem};
use crate::dispatch::{DispatchTable, SubscriptionEntry};
use crate::error::{ConnError, ServerError};
use crate::frame::{Command, Frame};
use crate::options::{ConnectOptions, DEFAULT_ACCEPT_VERSION};
use crate::receipt::Receipt;
use crate::session::{self, SessionConfig};
use crate::subscription::{AckMode, Subscription, SubscriptionOptions};

/// Handler for broker ERROR frames and malformed inbound data.
pub type ErrorHandler = Arc<dyn Fn(&ConnError) + Send + Sync>;

/// Handler for an unexpected end of the connection. Receives the cause.
pub type DropHandler = Arc<dyn Fn(&ConnError) + Send + Sync>;

/// Lifecycle of a connection.
///
/// `Connecting` only exists while `connect` runs; a `Connection` value
/// starts out `Connected`. `Closed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnecting,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }
}

/// Parse the STOMP `heart-beat` header value (format: "cx,cy").
///
/// Returns a tuple `(cx, cy)` where each value is the heartbeat interval in
/// milliseconds. Missing or invalid fields default to `0`.
pub fn parse_heartbeat_header(header: &str) -> (u64, u64) {
    let mut parts = header.split(',');
    let cx = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let cy = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    (cx, cy)
}

/// Negotiate heartbeat intervals between client and server.
///
/// Parameters are the client's `heart-beat` offer (`client_out`,
/// `client_in`) and the server's (`server_out`, `server_in`), in
/// milliseconds.
///
/// Returns `(outgoing, incoming)`. A direction is disabled (`None`) when
/// either side offers 0 for it; otherwise the interval is the larger of the
/// two values.
pub fn negotiate_heartbeats(
    client_out: u64,
    client_in: u64,
    server_out: u64,
    server_in: u64,
) -> (Option<Duration>, Option<Duration>) {
    let pick = |ours: u64, theirs: u64| {
        if ours == 0 || theirs == 0 {
            None
        } else {
            Some(Duration::from_millis(ours.max(theirs)))
        }
    };
    (pick(client_out, server_in), pick(client_in, server_out))
}

/// What the broker told us in CONNECTED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    /// `session` header
    pub session: Option<String>,
    /// Negotiated protocol version; `1.0` when the broker sent none.
    pub version: String,
    /// `server` header
    pub server: Option<String>,
    /// Negotiated `(outgoing, incoming)` heartbeat intervals.
    pub heartbeats: (Option<Duration>, Option<Duration>),
}

impl SessionInfo {
    fn from_connected(frame: &Frame, client_heartbeat: (u64, u64)) -> Self {
        let (sx, sy) = parse_heartbeat_header(frame.get_header("heart-beat").unwrap_or("0,0"));
        let (cx, cy) = client_heartbeat;
        Self {
            session: frame.get_header("session").map(str::to_string),
            version: frame.get_header("version").unwrap_or("1.0").to_string(),
            server: frame.get_header("server").map(str::to_string),
            heartbeats: negotiate_heartbeats(cx, cy, sx, sy),
        }
    }
}

/// State shared by every `Connection` handle and the session task.
pub(crate) struct Shared {
    pub(crate) dispatch: DispatchTable,
    pub(crate) state: watch::Sender<ConnectionState>,
    error_handler: Mutex<Option<ErrorHandler>>,
    drop_handler: Mutex<Option<DropHandler>>,
}

impl Shared {
    pub(crate) fn new(error_handler: Option<ErrorHandler>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            dispatch: DispatchTable::new(),
            state,
            error_handler: Mutex::new(error_handler),
            drop_handler: Mutex::new(None),
        }
    }

    pub(crate) async fn notify_error(&self, err: &ConnError) {
        let handler = self.error_handler.lock().await.clone();
        match handler {
            Some(handler) => handler(err),
            None => debug!(error = %err, "no error handler registered"),
        }
    }

    pub(crate) async fn notify_dropped(&self, cause: &ConnError) {
        let handler = self.drop_handler.lock().await.clone();
        if let Some(handler) = handler {
            handler(cause);
        }
    }
}

/// A live STOMP session with a broker.
///
/// `connect` performs the handshake and then spawns a background task that
/// owns the transport: it writes queued frames one at a time, reads and
/// dispatches inbound frames in order, and keeps heartbeats in both
/// directions. `Connection` is a cheap handle onto that task and may be
/// cloned and used from many tasks at once.
///
/// No reconnect is attempted. Register a
/// [`connection_dropped_handler`](Connection::connection_dropped_handler) and
/// connect again from there if that is wanted.
#[derive(Clone)]
pub struct Connection {
    outbound_tx: mpsc::Sender<StompItem>,
    shutdown_tx: broadcast::Sender<()>,
    shared: Arc<Shared>,
    info: Arc<SessionInfo>,
    disconnect_timeout: Duration,
}

impl Connection {
    /// Open a TCP connection to `host:port` and perform the STOMP handshake.
    ///
    /// The whole attempt, TCP connect included, is bounded by
    /// `options.connect_timeout`. Errors:
    /// - [`ConnError::Io`] when the TCP connection fails (e.g. refused)
    /// - [`ConnError::ServerRejected`] when the broker answers with ERROR
    /// - [`ConnError::Protocol`] when the broker closes before CONNECTED
    /// - [`ConnError::ConnectTimeout`] when the deadline passes
    pub async fn connect(host: &str, port: u16, options: ConnectOptions) -> Result<Self, ConnError> {
        let deadline = options.connect_timeout;
        let attempt = async {
            let stream = TcpStream::connect((host, port)).await?;
            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, "could not set TCP_NODELAY");
            }
            Self::handshake(stream, Some(host), options).await
        };
        tokio::time::timeout(deadline, attempt)
            .await
            .map_err(|_| ConnError::ConnectTimeout)?
    }

    /// Perform the STOMP handshake over an already established transport.
    ///
    /// Any duplex byte stream works: a TLS session, a WebSocket adapter, or
    /// an in-memory `tokio::io::duplex` pipe in tests. The `host` header
    /// defaults to `/` when `options.host` is unset.
    pub async fn connect_with_transport<T>(transport: T, options: ConnectOptions) -> Result<Self, ConnError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let deadline = options.connect_timeout;
        tokio::time::timeout(deadline, Self::handshake(transport, None, options))
            .await
            .map_err(|_| ConnError::ConnectTimeout)?
    }

    async fn handshake<T>(
        transport: T,
        network_host: Option<&str>,
        options: ConnectOptions,
    ) -> Result<Self, ConnError>
    where
        T: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let codec = StompCodec::new().with_max_frame_len(options.max_frame_len);
        let mut framed = Framed::new(transport, codec);

        let connect = connect_frame(&options, network_host);
        debug!(command = %connect.command, "sending handshake frame");
        framed.send(StompItem::Frame(connect)).await?;

        let connected = loop {
            match framed.next().await {
                Some(Ok(StompItem::Heartbeat)) => {}
                Some(Ok(StompItem::Frame(f))) => match f.command {
                    Command::Connected => break f,
                    Command::Error => {
                        let err = ServerError::from_frame(f);
                        warn!(message = %err.message, "broker rejected the handshake");
                        let rejected = ConnError::ServerRejected(err);
                        if let Some(handler) = &options.error_handler {
                            handler(&rejected);
                        }
                        return Err(rejected);
                    }
                    other => debug!(command = %other, "ignoring frame before CONNECTED"),
                },
                Some(Err(e)) => {
                    if let (ConnError::Malformed(_), Some(handler)) = (&e, &options.error_handler) {
                        handler(&e);
                    }
                    return Err(e);
                }
                None => {
                    return Err(ConnError::Protocol(
                        "connection closed before CONNECTED was received".into(),
                    ));
                }
            }
        };

        let info = SessionInfo::from_connected(&connected, options.heartbeat);
        if info.version == "1.0" {
            framed.codec_mut().set_escaping(false);
        }
        info!(
            session = ?info.session,
            version = %info.version,
            server = ?info.server,
            heartbeats = ?info.heartbeats,
            "STOMP session established"
        );

        let (outbound_tx, outbound_rx) = mpsc::channel::<StompItem>(32);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
        let shared = Arc::new(Shared::new(options.error_handler.clone()));
        shared.state.send_replace(ConnectionState::Connected);

        let config = SessionConfig {
            send_interval: info.heartbeats.0,
            recv_interval: info.heartbeats.1,
        };
        session::spawn(framed, outbound_rx, shutdown_rx, shared.clone(), config);

        Ok(Connection {
            outbound_tx,
            shutdown_tx,
            shared,
            info: Arc::new(info),
            disconnect_timeout: options.disconnect_timeout,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Session id assigned by the broker, if it sent one.
    pub fn session(&self) -> Option<&str> {
        self.info.session.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.info.version
    }

    pub fn server(&self) -> Option<&str> {
        self.info.server.as_deref()
    }

    /// Negotiated `(outgoing, incoming)` heartbeat intervals.
    pub fn heartbeats(&self) -> (Option<Duration>, Option<Duration>) {
        self.info.heartbeats
    }

    /// Ack ids delivered on `subscription_id` and not yet acknowledged,
    /// oldest first. Always empty for `auto` subscriptions.
    pub async fn pending_acks(&self, subscription_id: &str) -> Vec<String> {
        self.shared.dispatch.pending_acks(subscription_id).await
    }

    /// Number of receipts still waiting for the broker.
    pub async fn pending_receipts(&self) -> usize {
        self.shared.dispatch.pending_receipt_count().await
    }

    fn ensure_open(&self) -> Result<(), ConnError> {
        match self.state() {
            ConnectionState::Connected => Ok(()),
            _ => Err(ConnError::ConnectionClosed),
        }
    }

    /// Hand a frame to the writer. Frames are written in queue order.
    async fn enqueue(&self, frame: Frame) -> Result<(), ConnError> {
        self.outbound_tx
            .send(StompItem::Frame(frame))
            .await
            .map_err(|_| ConnError::ConnectionClosed)
    }

    /// Send a client frame.
    ///
    /// A receipt is requested only when the frame already carries a
    /// `receipt` header; the returned [`Receipt`] then resolves on the
    /// broker's answer. Otherwise it resolves at once with `frame`.
    ///
    /// Fails locally, writing nothing, when the frame names a transaction
    /// that is not open, when its `receipt` id is already pending, when a
    /// SEND has no `destination`, or when the command is not one a client
    /// may send after the handshake.
    pub async fn send_frame(&self, frame: Frame) -> Result<Receipt, ConnError> {
        self.ensure_open()?;
        if frame.command.is_server_command() || frame.command.is_handshake() {
            return Err(ConnError::Protocol(format!(
                "{} cannot be sent on an established connection",
                frame.command
            )));
        }
        if frame.command == Command::Send && !frame.has_header("destination") {
            return Err(ConnError::MissingHeader("destination"));
        }
        if let Some(tx) = frame.get_header("transaction") {
            if !self.shared.dispatch.has_transaction(tx).await {
                return Err(ConnError::UnknownTransaction(tx.to_string()));
            }
        }

        match frame.get_header("receipt").map(str::to_string) {
            Some(id) => {
                let rx = self.shared.dispatch.register_receipt(&id).await?;
                if let Err(e) = self.enqueue(frame).await {
                    self.shared.dispatch.discard_receipt(&id).await;
                    return Err(e);
                }
                Ok(Receipt::pending(id, rx))
            }
            None => {
                self.enqueue(frame.clone()).await?;
                Ok(Receipt::ready(frame))
            }
        }
    }

    /// Send `body` to `destination` with extra `headers`.
    ///
    /// Include a `receipt` header to have the returned [`Receipt`] wait for
    /// the broker; include `transaction` to send inside an open transaction.
    ///
    /// ```ignore
    /// conn.send("/queue/a", vec![], b"hello".to_vec()).await?;
    /// ```
    pub async fn send(
        &self,
        destination: &str,
        headers: Vec<(String, String)>,
        body: impl Into<Vec<u8>>,
    ) -> Result<Receipt, ConnError> {
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .headers(headers)
            .set_body(body);
        self.send_frame(frame).await
    }

    /// Like [`send`](Connection::send) but always requests a receipt, using a
    /// freshly generated id.
    pub async fn send_with_receipt(
        &self,
        destination: &str,
        headers: Vec<(String, String)>,
        body: impl Into<Vec<u8>>,
    ) -> Result<Receipt, ConnError> {
        let frame = Frame::new(Command::Send)
            .header("destination", destination)
            .headers(headers)
            .receipt(self.shared.dispatch.next_receipt_id())
            .set_body(body);
        self.send_frame(frame).await
    }

    /// Subscribe to `destination`; `handler` is called once per MESSAGE, in
    /// the order frames arrive. Returns the subscription id.
    ///
    /// Handlers run on the connection's reader task and must not block.
    pub async fn subscribe<F>(&self, destination: &str, ack: AckMode, handler: F) -> Result<String, ConnError>
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        self.subscribe_with_options(destination, ack, SubscriptionOptions::default(), handler)
            .await
    }

    /// Subscribe with extra SUBSCRIBE headers, a durable queue override, or a
    /// caller-chosen id (rejected if already in use).
    pub async fn subscribe_with_options<F>(
        &self,
        destination: &str,
        ack: AckMode,
        options: SubscriptionOptions,
        handler: F,
    ) -> Result<String, ConnError>
    where
        F: Fn(Frame) + Send + Sync + 'static,
    {
        self.ensure_open()?;
        let dispatch = &self.shared.dispatch;
        let destination = options
            .durable_queue
            .as_deref()
            .unwrap_or(destination)
            .to_string();
        let id = options
            .id
            .clone()
            .unwrap_or_else(|| dispatch.next_subscription_id());

        let entry = SubscriptionEntry {
            destination: destination.clone(),
            ack,
            handler: Arc::new(handler),
        };
        dispatch.register_subscription(&id, entry).await?;

        let frame = Frame::new(Command::Subscribe)
            .header("id", &id)
            .header("destination", &destination)
            .header("ack", ack.as_str())
            .headers(options.headers);
        if let Err(e) = self.enqueue(frame).await {
            dispatch.remove_subscription(&id).await;
            return Err(e);
        }
        Ok(id)
    }

    /// Subscribe and receive messages as a [`futures::Stream`].
    pub async fn subscribe_stream(&self, destination: &str, ack: AckMode) -> Result<Subscription, ConnError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self
            .subscribe(destination, ack, move |frame| {
                let _ = tx.send(frame);
            })
            .await?;
        Ok(Subscription::new(id, destination.to_string(), rx, self.clone()))
    }

    /// Stop a subscription.
    ///
    /// The subscription is removed locally before UNSUBSCRIBE is written:
    /// once this returns its handler is never called again, even for
    /// MESSAGE frames already in flight.
    pub async fn unsubscribe(&self, subscription_id: &str) -> Result<(), ConnError> {
        self.ensure_open()?;
        if self
            .shared
            .dispatch
            .remove_subscription(subscription_id)
            .await
            .is_none()
        {
            return Err(ConnError::UnknownSubscription(subscription_id.to_string()));
        }
        self.enqueue(Frame::new(Command::Unsubscribe).header("id", subscription_id))
            .await
    }

    /// Stop every subscription on `destination`.
    ///
    /// Each matching subscription is removed locally, then one UNSUBSCRIBE
    /// per id is written. Fails with [`ConnError::UnknownSubscription`],
    /// writing nothing, when no active subscription uses `destination`.
    /// Returns the ids that were stopped.
    pub async fn unsubscribe_destination(&self, destination: &str) -> Result<Vec<String>, ConnError> {
        self.ensure_open()?;
        let ids = self.shared.dispatch.remove_destination(destination).await;
        if ids.is_empty() {
            return Err(ConnError::UnknownSubscription(destination.to_string()));
        }
        for id in &ids {
            self.enqueue(Frame::new(Command::Unsubscribe).header("id", id))
                .await?;
        }
        Ok(ids)
    }

    /// Acknowledge a message delivered on a `client` or `client-individual`
    /// subscription.
    ///
    /// `ack_id` is the message's `ack` header, or its `message-id` when the
    /// broker sent no `ack` (STOMP 1.0/1.1). The first is answered with an
    /// `id` header, the second with `message-id` and `subscription`. With
    /// `client` mode the acknowledgement is cumulative.
    /// An id that was never delivered, or was already acknowledged, fails
    /// with [`ConnError::UnknownAckId`] and nothing is written.
    pub async fn ack(&self, ack_id: &str) -> Result<(), ConnError> {
        self.acknowledge(Command::Ack, ack_id, None).await
    }

    /// Negative-acknowledge a delivered message.
    pub async fn nack(&self, ack_id: &str) -> Result<(), ConnError> {
        self.acknowledge(Command::Nack, ack_id, None).await
    }

    /// Acknowledge inside an open transaction.
    pub async fn ack_with_transaction(&self, ack_id: &str, transaction_id: &str) -> Result<(), ConnError> {
        self.acknowledge(Command::Ack, ack_id, Some(transaction_id))
            .await
    }

    /// Negative-acknowledge inside an open transaction.
    pub async fn nack_with_transaction(&self, ack_id: &str, transaction_id: &str) -> Result<(), ConnError> {
        self.acknowledge(Command::Nack, ack_id, Some(transaction_id))
            .await
    }

    async fn acknowledge(
        &self,
        command: Command,
        ack_id: &str,
        transaction_id: Option<&str>,
    ) -> Result<(), ConnError> {
        self.ensure_open()?;
        let dispatch = &self.shared.dispatch;
        if let Some(tx) = transaction_id {
            if !dispatch.has_transaction(tx).await {
                return Err(ConnError::UnknownTransaction(tx.to_string()));
            }
        }
        let retired = dispatch.retire_ack(ack_id).await?;

        // answer in the shape of the header the id came from
        let mut f = Frame::new(command);
        f = if retired.from_ack_header {
            f.header("id", ack_id)
        } else {
            f.header("message-id", ack_id)
                .header("subscription", retired.subscription)
        };
        if let Some(tx) = transaction_id {
            f = f.header("transaction", tx);
        }
        self.enqueue(f).await
    }

    /// Helper to send a transaction frame (BEGIN, COMMIT, or ABORT).
    async fn send_transaction_frame(&self, command: Command, transaction_id: &str) -> Result<(), ConnError> {
        let f = Frame::new(command).header("transaction", transaction_id);
        self.enqueue(f).await
    }

    /// Begin a transaction.
    ///
    /// SEND, ACK and NACK frames naming `transaction_id` are accepted until
    /// the transaction is committed or aborted. Beginning an id that is
    /// already open fails with [`ConnError::TransactionExists`].
    pub async fn begin(&self, transaction_id: &str) -> Result<(), ConnError> {
        self.ensure_open()?;
        self.shared
            .dispatch
            .begin_transaction(transaction_id)
            .await?;
        if let Err(e) = self
            .send_transaction_frame(Command::Begin, transaction_id)
            .await
        {
            let _ = self.shared.dispatch.end_transaction(transaction_id).await;
            return Err(e);
        }
        Ok(())
    }

    /// Begin a transaction with a generated id and return it.
    pub async fn begin_new(&self) -> Result<String, ConnError> {
        let id = self.shared.dispatch.next_transaction_id();
        self.begin(&id).await?;
        Ok(id)
    }

    /// Commit a transaction.
    ///
    /// Committing an id that was never begun (or already finished) fails
    /// with [`ConnError::UnknownTransaction`] and writes nothing.
    pub async fn commit(&self, transaction_id: &str) -> Result<(), ConnError> {
        self.ensure_open()?;
        self.shared.dispatch.end_transaction(transaction_id).await?;
        self.send_transaction_frame(Command::Commit, transaction_id)
            .await
    }

    /// Abort a transaction. Same rules as [`commit`](Connection::commit).
    pub async fn abort(&self, transaction_id: &str) -> Result<(), ConnError> {
        self.ensure_open()?;
        self.shared.dispatch.end_transaction(transaction_id).await?;
        self.send_transaction_frame(Command::Abort, transaction_id)
            .await
    }

    /// Install the handler for ERROR frames and malformed inbound data,
    /// replacing any previous one.
    pub async fn error_handler<F>(&self, handler: F)
    where
        F: Fn(&ConnError) + Send + Sync + 'static,
    {
        *self.shared.error_handler.lock().await = Some(Arc::new(handler));
    }

    /// Install the handler called once when the connection ends without
    /// `disconnect` having been requested, replacing any previous one.
    pub async fn connection_dropped_handler<F>(&self, handler: F)
    where
        F: Fn(&ConnError) + Send + Sync + 'static,
    {
        *self.shared.drop_handler.lock().await = Some(Arc::new(handler));
    }

    /// Gracefully end the session.
    ///
    /// Writes DISCONNECT with a fresh receipt id and waits for the matching
    /// RECEIPT, the transport closing, or `disconnect_timeout`, whichever
    /// comes first, then closes the transport. Always completes. Calling it
    /// while another disconnect is in progress waits for that one; calling
    /// it on a terminated connection fails with
    /// [`ConnError::ConnectionClosed`].
    pub async fn disconnect(&self) -> Result<(), ConnError> {
        let entered = self.shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Connected {
                *state = ConnectionState::Disconnecting;
                true
            } else {
                false
            }
        });
        if !entered {
            if self.state().is_terminal() {
                return Err(ConnError::ConnectionClosed);
            }
            self.wait_terminated().await;
            return Ok(());
        }

        let dispatch = &self.shared.dispatch;
        let (receipt_id, rx) = dispatch.register_fresh_receipt().await;
        let frame = Frame::new(Command::Disconnect).header("receipt", &receipt_id);
        debug!(receipt = %receipt_id, "sending DISCONNECT");

        if self.outbound_tx.send(StompItem::Frame(frame)).await.is_ok() {
            let receipt = Receipt::pending(receipt_id.clone(), rx);
            match tokio::time::timeout(self.disconnect_timeout, receipt).await {
                Ok(Ok(_)) => debug!(receipt = %receipt_id, "DISCONNECT confirmed"),
                Ok(Err(e)) => debug!(error = %e, "session ended before DISCONNECT receipt"),
                Err(_) => {
                    warn!(receipt = %receipt_id, "no DISCONNECT receipt before timeout, closing");
                    dispatch.discard_receipt(&receipt_id).await;
                }
            }
        }

        let _ = self.shutdown_tx.send(());
        self.wait_terminated().await;
        Ok(())
    }

    async fn wait_terminated(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|state| state.is_terminal()).await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("session", &self.info.session)
            .field("version", &self.info.version)
            .finish()
    }
}

/// Build the CONNECT (or STOMP) frame that opens a session.
fn connect_frame(options: &ConnectOptions, network_host: Option<&str>) -> Frame {
    let command = if options.use_stomp_frame {
        Command::Stomp
    } else {
        Command::Connect
    };
    let mut f = Frame::new(command).header(
        "accept-version",
        options
            .accept_version
            .as_deref()
            .unwrap_or(DEFAULT_ACCEPT_VERSION),
    );
    if !options.bypass_host_header {
        let host = options.host.as_deref().or(network_host).unwrap_or("/");
        f = f.header("host", host);
    }
    if let Some(login) = &options.login {
        f = f.header("login", login);
    }
    if let Some(passcode) = &options.passcode {
        f = f.header("passcode", passcode);
    }
    f = f.header("heart-beat", options.heartbeat_header());
    if let Some(client_id) = &options.client_id {
        f = f.header("client-id", client_id);
    }
    f.headers(options.headers.iter().cloned())
}
