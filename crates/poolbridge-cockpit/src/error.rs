//! Errors raised by the HTTP side of the bridge.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Why a single request could not be read.
///
/// Only ever affects the connection it happened on.
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    #[error("request body of {declared} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { declared: u64, limit: usize },

    #[error("connection closed before a full request was read")]
    PeerClosed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RequestError {
    /// Status to answer with, or `None` when the peer is gone and there is
    /// nobody left to answer.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RequestError::Malformed(_) | RequestError::InvalidContentLength(_) => Some(400),
            RequestError::PayloadTooLarge { .. } => Some(413),
            RequestError::PeerClosed | RequestError::Io(_) => None,
        }
    }
}

/// Process-level server failure.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("cannot bind HTTP listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
