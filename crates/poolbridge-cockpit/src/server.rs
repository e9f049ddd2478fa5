//! [`BridgeServer`] – the HTTP + event-stream front of the bridge.
//!
//! Listens on `0.0.0.0:4200` (configurable via [`BridgeServer::with_port`]
//! and [`BridgeServer::with_bind_address`]).  Every accepted connection runs
//! on its own task and serves exactly one request:
//!
//! * regular requests → one response from the [`Router`], then close;
//! * `/events`, or `/ws` without an upgrade header → Server-Sent Events;
//! * `/ws` with `Upgrade: websocket` → WebSocket, one text message per
//!   snapshot.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use poolbridge_kernel::{CommandGate, StateStore};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::http::{Request, Response, read_request, write_response};
use crate::router::{Dispatch, Router};
use crate::stream::{DEFAULT_STREAM_INTERVAL, accept_websocket, run_sse, run_websocket};

/// Default TCP port for the bridge.
pub const DEFAULT_PORT: u16 = 4200;

/// Default largest accepted request body, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;

/// HTTP server exposing the [`StateStore`] and [`CommandGate`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use poolbridge_cockpit::BridgeServer;
/// use poolbridge_kernel::{CommandGate, LinkSlot, StateStore};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let store = Arc::new(StateStore::new());
///     let gate = CommandGate::new(LinkSlot::new());
///     BridgeServer::new(store, gate)
///         .with_port(8080)
///         .run(CancellationToken::new())
///         .await
///         .expect("bridge server failed");
/// }
/// ```
pub struct BridgeServer {
    router: Router,
    bind_address: IpAddr,
    port: u16,
    stream_interval: Duration,
    max_body_bytes: usize,
}

/// Per-connection settings shared by every connection task.
struct Connection {
    router: Router,
    stream_interval: Duration,
    max_body_bytes: usize,
    cancel: CancellationToken,
}

impl BridgeServer {
    /// Create a server over `store` and `gate` on the [`DEFAULT_PORT`].
    pub fn new(store: Arc<StateStore>, gate: CommandGate) -> Self {
        Self {
            router: Router::new(store, gate),
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            stream_interval: DEFAULT_STREAM_INTERVAL,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    /// Override the listening port (builder-style).
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the listening address (builder-style).
    pub fn with_bind_address(mut self, address: IpAddr) -> Self {
        self.bind_address = address;
        self
    }

    /// Override how often streaming subscribers poll the store.
    pub fn with_stream_interval(mut self, interval: Duration) -> Self {
        self.stream_interval = interval;
        self
    }

    /// Override the largest accepted request body.
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Return the configured port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Return the configured socket address.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    /// Bind the configured address and serve until `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Bind`] if the TCP listener cannot bind.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BridgeError> {
        let addr = self.addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BridgeError::Bind { addr, source })?;
        self.serve(listener, cancel).await
    }

    /// Serve on an already bound `listener` until `cancel` fires.
    ///
    /// Open event streams are ended through the same token.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the listener's address is unavailable.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) -> Result<(), BridgeError> {
        let local = listener.local_addr()?;
        info!(addr = %local, "HTTP bridge listening");

        let shared = Arc::new(Connection {
            router: self.router,
            stream_interval: self.stream_interval,
            max_body_bytes: self.max_body_bytes,
            cancel: cancel.clone(),
        });

        loop {
            let (stream, peer) = tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                },
            };

            let shared = Arc::clone(&shared);
            let span = info_span!("connection", %peer, id = %Uuid::new_v4());
            tokio::spawn(async move { handle_connection(stream, &shared).await }.instrument(span));
        }

        info!("HTTP bridge stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection<S>(stream: S, shared: &Connection)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = BufReader::new(stream);

    let request = match read_request(&mut conn, shared.max_body_bytes).await {
        Ok(request) => request,
        Err(e) => {
            match e.status_code() {
                Some(status) => {
                    debug!(error = %e, status, "rejecting request");
                    if let Err(e) = write_response(&mut conn, &Response::error(status, &e.to_string())).await {
                        debug!(error = %e, "client gone before error response");
                    }
                }
                None => debug!(error = %e, "connection closed before a request"),
            }
            return;
        }
    };
    debug!(method = %request.method, target = %request.target, "request");

    match shared.router.dispatch(&request).await {
        Dispatch::Respond(response) => {
            if let Err(e) = write_response(&mut conn, &response).await {
                debug!(error = %e, status = response.status, "client gone before response");
            }
        }
        Dispatch::Stream => stream_to(conn, &request, shared).await,
    }
}

async fn stream_to<S>(mut conn: BufReader<S>, request: &Request, shared: &Connection)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let store = shared.router.store();

    let end = if request.wants_websocket() {
        let Some(key) = request.header("sec-websocket-key") else {
            let response = Response::error(400, "missing Sec-WebSocket-Key");
            if let Err(e) = write_response(&mut conn, &response).await {
                debug!(error = %e, "client gone before error response");
            }
            return;
        };
        let ws = match accept_websocket(conn, key).await {
            Ok(ws) => ws,
            Err(e) => {
                debug!(error = %e, "websocket handshake failed");
                return;
            }
        };
        info!("websocket subscriber connected");
        run_websocket(ws, store, shared.stream_interval, &shared.cancel).await
    } else {
        info!("event-stream subscriber connected");
        let (reader, writer) = tokio::io::split(conn);
        run_sse(reader, writer, store, shared.stream_interval, &shared.cancel).await
    };

    debug!(?end, "stream ended");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
