//! Error types for transport operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use super::ConnectionId;

/// Connection-level faults. They end the affected connection only.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind TCP listener at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to read listener address: {source}")]
    LocalAddr {
        #[source]
        source: io::Error,
    },
    #[error("connection {id} is closed")]
    Closed { id: ConnectionId },
    #[error("i/o failure on connection {id}: {source}")]
    Io {
        id: ConnectionId,
        #[source]
        source: io::Error,
    },
    #[error("listener task panicked")]
    ListenerPanic,
}
