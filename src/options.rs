use std::fmt;
use std::time::Duration;

use crate::codec::DEFAULT_MAX_FRAME_LEN;
use crate::connection::ErrorHandler;
use crate::error::ConnError;

/// Versions offered in `accept-version` when none is configured.
pub const DEFAULT_ACCEPT_VERSION: &str = "1.0,1.1,1.2";

/// Options applied when establishing a connection.
///
/// Built in the usual builder style:
///
/// ```ignore
/// let opts = ConnectOptions::default()
///     .login("guest", "guest")
///     .host("/")
///     .heartbeat(10_000, 10_000);
/// let conn = Connection::connect("localhost", 61613, opts).await?;
/// ```
#[derive(Clone)]
pub struct ConnectOptions {
    /// `login` header, sent when set.
    pub login: Option<String>,
    /// `passcode` header, sent when set.
    pub passcode: Option<String>,
    /// Virtual host for the `host` header. Defaults to the network host.
    pub host: Option<String>,
    /// `accept-version` header. Defaults to [`DEFAULT_ACCEPT_VERSION`].
    pub accept_version: Option<String>,
    /// `client-id` header used by some brokers for durable subscriptions.
    pub client_id: Option<String>,
    /// Client heart-beat offer `(cx, cy)` in milliseconds: how often we can
    /// send, and how often we want to receive.
    pub heartbeat: (u64, u64),
    /// Bound on the whole handshake, TCP connect included.
    pub connect_timeout: Duration,
    /// How long `disconnect` waits for the DISCONNECT receipt.
    pub disconnect_timeout: Duration,
    /// Largest frame the reader will buffer.
    pub max_frame_len: usize,
    /// Send `STOMP` instead of `CONNECT` as the first frame.
    pub use_stomp_frame: bool,
    /// Omit the `host` header (for 1.0 brokers that reject it).
    pub bypass_host_header: bool,
    /// Extra headers appended to the CONNECT frame.
    pub headers: Vec<(String, String)>,
    /// Handler for ERROR frames and malformed input, installed before the
    /// handshake so a rejected CONNECT reaches it too.
    pub(crate) error_handler: Option<ErrorHandler>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            login: None,
            passcode: None,
            host: None,
            accept_version: None,
            client_id: None,
            heartbeat: (10_000, 10_000),
            connect_timeout: Duration::from_secs(30),
            disconnect_timeout: Duration::from_secs(10),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            use_stomp_frame: false,
            bypass_host_header: false,
            headers: Vec::new(),
            error_handler: None,
        }
    }
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(mut self, login: impl Into<String>, passcode: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self.passcode = Some(passcode.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn accept_version(mut self, version: impl Into<String>) -> Self {
        self.accept_version = Some(version.into());
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// Heart-beat offer in milliseconds. `(0, 0)` disables heartbeats.
    pub fn heartbeat(mut self, send_ms: u64, receive_ms: u64) -> Self {
        self.heartbeat = (send_ms, receive_ms);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    pub fn max_frame_len(mut self, len: usize) -> Self {
        self.max_frame_len = len;
        self
    }

    pub fn use_stomp_frame(mut self, enabled: bool) -> Self {
        self.use_stomp_frame = enabled;
        self
    }

    pub fn bypass_host_header(mut self, enabled: bool) -> Self {
        self.bypass_host_header = enabled;
        self
    }

    /// Add a custom CONNECT header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Register the error handler before connecting.
    ///
    /// It receives [`ConnError::ServerRejected`] for an ERROR answering the
    /// handshake, [`ConnError::Server`] for later ERROR frames, and
    /// [`ConnError::Malformed`] when the inbound stream breaks.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&ConnError) + Send + Sync + 'static,
    {
        self.error_handler = Some(std::sync::Arc::new(handler));
        self
    }

    pub(crate) fn heartbeat_header(&self) -> String {
        format!("{},{}", self.heartbeat.0, self.heartbeat.1)
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("login", &self.login)
            .field("passcode", &self.passcode.as_ref().map(|_| "***"))
            .field("host", &self.host)
            .field("accept_version", &self.accept_version)
            .field("client_id", &self.client_id)
            .field("heartbeat", &self.heartbeat)
            .field("connect_timeout", &self.connect_timeout)
            .field("disconnect_timeout", &self.disconnect_timeout)
            .field("max_frame_len", &self.max_frame_len)
            .field("use_stomp_frame", &self.use_stomp_frame)
            .field("bypass_host_header", &self.bypass_host_header)
            .field("headers", &self.headers)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}
