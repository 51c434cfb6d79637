use crate::core::errors::ExchangeError;
use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio_tungstenite::tungstenite::{self, client::IntoClientRequest, protocol::Message};
use tokio_tungstenite::{client_async_tls, connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument};

/// Write half of a dialed socket.
pub type WsSink = Pin<Box<dyn Sink<Message, Error = ExchangeError> + Send>>;

/// Read half of a dialed socket.
pub type WsStream = Pin<Box<dyn Stream<Item = Result<Message, ExchangeError>> + Send>>;

/// Whether a worker failure tears down only its own connection or the whole client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TeardownScope {
    /// Each connection class lives and dies on its own
    #[default]
    Connection,
    /// Any worker failure cancels the client root scope, taking every class down
    Client,
}

/// Timing and sizing policy of the streaming client
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Upper bound on the WebSocket upgrade handshake
    pub handshake_timeout: Duration,
    /// Interval between dial attempts while `connect` retries
    pub redial_interval: Duration,
    /// Write deadline for a single outbound frame
    pub write_wait: Duration,
    /// Read deadline; no inbound frame within it means the peer is dead
    pub read_wait: Duration,
    /// Idle time after which the sender emits a keep-alive ping
    pub ping_period: Duration,
    /// How often the sender checks for idleness
    pub ping_tick: Duration,
    /// Age after which a pending login is considered lost
    pub login_stale_after: Duration,
    /// Re-check interval while waiting for authorization
    pub auth_poll_interval: Duration,
    /// Capacity of each class's outbound queue
    pub outbound_capacity: usize,
    /// Local address outgoing sockets are bound to
    pub local_ip: Option<IpAddr>,
    pub teardown_scope: TeardownScope,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(45),
            redial_interval: Duration::from_secs(2),
            write_wait: Duration::from_secs(3),
            read_wait: Duration::from_secs(25),
            ping_period: Duration::from_secs(15),
            ping_tick: Duration::from_millis(300),
            login_stale_after: Duration::from_secs(30),
            auth_poll_interval: Duration::from_millis(300),
            outbound_capacity: 3,
            local_ip: None,
            teardown_scope: TeardownScope::Connection,
        }
    }
}

impl WsConfig {
    #[must_use]
    pub const fn with_teardown_scope(mut self, scope: TeardownScope) -> Self {
        self.teardown_scope = scope;
        self
    }

    #[must_use]
    pub const fn with_local_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.local_ip = ip;
        self
    }
}

/// Opens duplex message sockets
///
/// The streaming client only ever sees the split halves, which keeps it
/// independent of the concrete WebSocket stack and lets tests substitute an
/// in-memory peer.
#[async_trait]
pub trait WsDialer: Send + Sync {
    async fn dial(&self, url: &str) -> Result<(WsSink, WsStream), ExchangeError>;
}

/// tokio-tungstenite backed dialer
#[derive(Debug, Clone)]
pub struct TungsteniteDialer {
    handshake_timeout: Duration,
    local_ip: Option<IpAddr>,
}

impl TungsteniteDialer {
    pub fn new(config: &WsConfig) -> Self {
        Self {
            handshake_timeout: config.handshake_timeout,
            local_ip: config.local_ip,
        }
    }

    async fn handshake(
        &self,
        url: &str,
    ) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, ExchangeError> {
        let request = url.into_client_request().map_err(dial_error)?;

        let (ws, response) = match self.local_ip {
            None => connect_async(request).await.map_err(dial_error)?,
            Some(ip) => {
                let stream = bind_and_connect(&request, ip).await?;
                client_async_tls(request, stream)
                    .await
                    .map_err(dial_error)?
            }
        };

        debug!(status = %response.status(), "WebSocket upgrade accepted");
        Ok(ws)
    }
}

#[async_trait]
impl WsDialer for TungsteniteDialer {
    #[instrument(skip(self), fields(local_ip = ?self.local_ip))]
    async fn dial(&self, url: &str) -> Result<(WsSink, WsStream), ExchangeError> {
        let ws = tokio::time::timeout(self.handshake_timeout, self.handshake(url))
            .await
            .map_err(|_| ExchangeError::DialError {
                status: None,
                message: format!("handshake timed out after {:?}", self.handshake_timeout),
            })??;

        let (write, read) = ws.split();
        let sink: WsSink = Box::pin(write.sink_map_err(ExchangeError::from));
        let stream: WsStream = Box::pin(read.map(|frame| frame.map_err(ExchangeError::from)));
        Ok((sink, stream))
    }
}

/// Open a TCP connection to the request's host from a fixed local address.
async fn bind_and_connect(
    request: &tungstenite::handshake::client::Request,
    ip: IpAddr,
) -> Result<TcpStream, ExchangeError> {
    let uri = request.uri();
    let host = uri.host().ok_or_else(|| ExchangeError::DialError {
        status: None,
        message: format!("missing host in {}", uri),
    })?;
    let port = uri
        .port_u16()
        .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

    let io_error = |e: std::io::Error| ExchangeError::DialError {
        status: None,
        message: e.to_string(),
    };

    let remote = tokio::net::lookup_host((host, port))
        .await
        .map_err(io_error)?
        .find(|addr| addr.is_ipv4() == ip.is_ipv4())
        .ok_or_else(|| ExchangeError::DialError {
            status: None,
            message: format!("no address of {} matches local {}", host, ip),
        })?;

    let socket = if ip.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(io_error)?;
    socket.bind(SocketAddr::new(ip, 0)).map_err(io_error)?;
    socket.connect(remote).await.map_err(io_error)
}

/// Map a handshake failure, keeping the status the server answered with.
fn dial_error(err: tungstenite::Error) -> ExchangeError {
    match err {
        tungstenite::Error::Http(response) => ExchangeError::DialError {
            status: Some(response.status().as_u16()),
            message: format!("upgrade rejected: {}", response.status()),
        },
        other => ExchangeError::DialError {
            status: None,
            message: other.to_string(),
        },
    }
}
