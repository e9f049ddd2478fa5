//! `poolbridge-cockpit` – The HTTP Front of the Bridge
//!
//! Boots a lightweight HTTP server (default port `4200`) that:
//!
//! 1. **Serves** the latest controller snapshot (`/state/all`,
//!    `/state/circuits`) and link health (`/health`) from the shared
//!    [`StateStore`].
//!
//! 2. **Streams** every new snapshot to subscribed clients, as
//!    Server-Sent Events on `/events` (and `/ws`), or as WebSocket text
//!    messages when `/ws` is requested with `Upgrade: websocket`.
//!
//! 3. **Accepts** circuit commands on `PUT /state/circuit/setState` and
//!    passes them through the [`CommandGate`] before they reach the
//!    controller.
//!
//! Every response carries permissive CORS headers; `OPTIONS` on any path is
//! answered with `204`.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use poolbridge_cockpit::BridgeServer;
//! use poolbridge_kernel::{CommandGate, LinkSlot, StateStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(StateStore::new());
//!     let gate = CommandGate::new(LinkSlot::new());
//!     BridgeServer::new(store, gate)
//!         .run(CancellationToken::new())
//!         .await
//!         .expect("bridge server failed");
//! }
//! ```
//!
//! [`StateStore`]: poolbridge_kernel::StateStore
//! [`CommandGate`]: poolbridge_kernel::CommandGate

pub mod error;
pub mod http;
pub mod router;
pub mod server;
pub mod stream;

pub use error::{BridgeError, RequestError};
pub use router::{Dispatch, Router};
pub use server::{BridgeServer, DEFAULT_MAX_BODY_BYTES, DEFAULT_PORT};
pub use stream::{DEFAULT_STREAM_INTERVAL, SnapshotCursor, StreamEnd};
