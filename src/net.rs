//! TCP transport helpers
//!
//! Outbound connections with bounded retry, a listening socket that is bound
//! once and reused, and blocking accept. Nothing here knows about TLS.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

/// Default number of connect attempts
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 20;

/// Default wait between connect attempts
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_millis(200);

/// Listen backlog
pub const LISTEN_BACKLOG: i32 = 128;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Socket creation failed: {0}")]
    Socket(#[source] io::Error),

    #[error("Connect failed: {0}")]
    Connect(#[source] io::Error),

    #[error("Connect failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("Bind to {endpoint} failed: {source}")]
    Bind {
        endpoint: Endpoint,
        #[source]
        source: io::Error,
    },

    #[error("Listen failed: {0}")]
    Listen(#[source] io::Error),

    #[error("Accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("Socket option failed: {0}")]
    SocketOption(#[source] io::Error),
}

/// IPv4 address and port to connect to or listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddrV4);

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Endpoint(SocketAddrV4::new(ip, port))
    }

    /// Build an endpoint from a dotted IPv4 literal and a port
    pub fn parse(host: &str, port: u16) -> Result<Self> {
        let ip = host
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::InvalidAddress(host.to_string()))?;
        Ok(Endpoint::new(ip, port))
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        self.0
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<SocketAddrV4>()
            .map(Endpoint)
            .map_err(|_| Error::InvalidAddress(s.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Bounded connect retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub attempts: u32,
    /// Wait between two consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        RetryPolicy { attempts: attempts.max(1), delay }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_RETRY_WAIT)
    }
}

/// Options applied to every connection the helpers hand out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportOptions {
    pub retry: RetryPolicy,
    /// Read/write timeout on connected sockets. `None` leaves them blocking.
    pub io_timeout: Option<Duration>,
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. Only [`Error::Connect`] failures
/// are retried; any other error is returned at once. On success the value is
/// returned together with the number of attempts it took. The policy delay is
/// slept between attempts, never after the last one.
pub fn retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<(T, u32)>
where
    F: FnMut(u32) -> Result<T>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok((value, attempt)),
            Err(Error::Connect(source)) if attempt >= attempts => {
                return Err(Error::RetriesExhausted { attempts: attempt, source });
            }
            Err(Error::Connect(e)) => {
                tracing::debug!(attempt, error = %e, "connect attempt failed, retrying");
                if !policy.delay.is_zero() {
                    thread::sleep(policy.delay);
                }
                attempt += 1;
            }
            Err(other) => return Err(other),
        }
    }
}

/// An established TCP connection
///
/// Owns the socket; dropping it closes the descriptor.
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    attempts: u32,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr, attempts: u32) -> Self {
        Connection { stream, peer, attempts }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Number of connect attempts this connection took (1 when accepted)
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn stream(&self) -> &TcpStream {
        &self.stream
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    fn apply_options(&self, options: &TransportOptions) -> Result<()> {
        if let Some(timeout) = options.io_timeout {
            self.stream
                .set_read_timeout(Some(timeout))
                .and_then(|_| self.stream.set_write_timeout(Some(timeout)))
                .map_err(Error::SocketOption)?;
        }
        Ok(())
    }
}

/// Open an outbound connection, retrying per `options.retry`
///
/// A fresh socket is used for every attempt; a socket whose connect failed is
/// closed before the next attempt starts.
pub fn connect(endpoint: &Endpoint, options: &TransportOptions) -> Result<Connection> {
    let addr = SockAddr::from(endpoint.socket_addr());

    let (socket, attempts) = retry(&options.retry, |attempt| {
        let socket = new_socket().map_err(Error::Socket)?;
        tracing::trace!(attempt, %endpoint, "connecting");
        socket.connect(&addr).map_err(Error::Connect)?;
        Ok(socket)
    })?;

    let stream = TcpStream::from(socket);
    let conn = Connection::new(stream, SocketAddr::V4(endpoint.socket_addr()), attempts);
    conn.apply_options(options)?;
    tracing::debug!(%endpoint, attempts, "TCP connection established");
    Ok(conn)
}

/// Listening socket, bound once and reused for every accept
#[derive(Debug)]
pub struct ListenSocket {
    listener: TcpListener,
}

impl ListenSocket {
    /// Endpoint actually bound (useful when listening on port 0)
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match self.listener.local_addr().map_err(Error::Listen)? {
            SocketAddr::V4(addr) => Ok(Endpoint(addr)),
            SocketAddr::V6(addr) => Err(Error::InvalidAddress(addr.to_string())),
        }
    }
}

/// Bind and listen on `endpoint`
pub fn listen(endpoint: &Endpoint) -> Result<ListenSocket> {
    let socket = new_socket().map_err(Error::Socket)?;
    socket.set_reuse_address(true).map_err(Error::SocketOption)?;
    socket
        .bind(&SockAddr::from(endpoint.socket_addr()))
        .map_err(|source| Error::Bind { endpoint: *endpoint, source })?;
    socket.listen(LISTEN_BACKLOG).map_err(Error::Listen)?;
    tracing::debug!(%endpoint, "listening");
    Ok(ListenSocket { listener: TcpListener::from(socket) })
}

/// Block until one inbound connection arrives
pub fn accept(listener: &ListenSocket, options: &TransportOptions) -> Result<Connection> {
    let (stream, peer) = listener.listener.accept().map_err(Error::Accept)?;
    let conn = Connection::new(stream, peer, 1);
    conn.apply_options(options)?;
    tracing::debug!(%peer, "TCP connection accepted");
    Ok(conn)
}

fn new_socket() -> io::Result<Socket> {
    Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))
}
