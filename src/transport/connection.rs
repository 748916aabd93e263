//! Connection abstraction shared by both transports.

use async_trait::async_trait;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{watch, Mutex},
};

use super::TransportError;

pub type ConnectionId = u64;

/// One transport-level channel that response lines are written to.
#[async_trait]
pub trait Connection: Send + Sync {
    fn id(&self) -> ConnectionId;

    fn peer(&self) -> &str;

    /// Writes `line` followed by a newline. Fails once the connection is closed.
    async fn write_line(&self, line: &str) -> Result<(), TransportError>;

    /// Marks the connection closed and wakes its reader. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Yields `true` once [`Connection::close`] has been called.
    fn closed(&self) -> watch::Receiver<bool>;
}

/// [`Connection`] over any async byte sink.
pub struct StreamConnection<W> {
    id: ConnectionId,
    peer: String,
    writer: Mutex<W>,
    closed: watch::Sender<bool>,
}

impl<W> StreamConnection<W> {
    pub fn new(id: ConnectionId, peer: impl Into<String>, writer: W) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            id,
            peer: peer.into(),
            writer: Mutex::new(writer),
            closed,
        }
    }
}

#[async_trait]
impl<W> Connection for StreamConnection<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn peer(&self) -> &str {
        &self.peer
    }

    async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed { id: self.id });
        }

        let mut writer = self.writer.lock().await;
        let io_error = |source| TransportError::Io {
            id: self.id,
            source,
        };
        writer.write_all(line.as_bytes()).await.map_err(io_error)?;
        writer.write_all(b"\n").await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)
    }

    fn close(&self) {
        self.closed.send_replace(true);
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}
