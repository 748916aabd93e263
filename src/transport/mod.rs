//! Socket and standard-stream transports
//!
//! Both transports feed raw reads through a per-connection [`LineFramer`] and
//! hand every complete line to the shared [`Dispatcher`]. Each line is
//! dispatched on its own task, so a slow handler never holds back later lines
//! from the same read; callers correlate responses by `id`, not by order.

mod connection;
mod errors;
mod registry;
mod socket;
mod stdio;

use std::sync::Arc;

use tokio::{
    io::{AsyncRead, AsyncReadExt},
    sync::watch,
    task::JoinSet,
};
use tracing::{debug, warn};

use crate::mcp::{dispatcher::Dispatcher, framer::LineFramer};

pub use self::connection::{Connection, ConnectionId, StreamConnection};
pub use self::errors::TransportError;
pub use self::registry::ConnectionRegistry;
pub use self::socket::{SocketServerHandle, SocketTransport};
pub use self::stdio::{serve_stdio, serve_stdio_streams};

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Why a connection's read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadLoopExit {
    EndOfInput,
    Closed,
}

/// Reads `reader` until end of input, a read error, or the connection being
/// closed. On end of input, responses still being computed are written before
/// returning; on close they are abandoned.
pub(crate) async fn serve_lines<R>(
    mut reader: R,
    connection: Arc<dyn Connection>,
    dispatcher: Dispatcher,
) -> Result<ReadLoopExit, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut in_flight = JoinSet::new();
    let mut chunk = vec![0_u8; READ_CHUNK_BYTES];
    let closed = wait_closed(connection.closed());
    tokio::pin!(closed);

    loop {
        tokio::select! {
            () = &mut closed => return Ok(ReadLoopExit::Closed),
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            read = reader.read(&mut chunk) => {
                let bytes_read = read.map_err(|source| TransportError::Io {
                    id: connection.id(),
                    source,
                })?;
                if bytes_read == 0 {
                    break;
                }

                for line in framer.push(&chunk[..bytes_read]) {
                    in_flight.spawn(respond(dispatcher.clone(), Arc::clone(&connection), line));
                }
            }
        }
    }

    if !framer.remainder().is_empty() {
        debug!(
            connection = connection.id(),
            bytes = framer.remainder().len(),
            "discarding unterminated input"
        );
    }

    loop {
        tokio::select! {
            () = &mut closed => return Ok(ReadLoopExit::Closed),
            next = in_flight.join_next() => {
                if next.is_none() {
                    return Ok(ReadLoopExit::EndOfInput);
                }
            }
        }
    }
}

async fn respond(dispatcher: Dispatcher, connection: Arc<dyn Connection>, line: Vec<u8>) {
    let Some(response) = dispatcher.dispatch(&line).await else {
        return;
    };

    if let Err(error) = connection.write_line(&response).await {
        warn!(
            connection = connection.id(),
            peer = %connection.peer(),
            error = %error,
            "failed to write response"
        );
    }
}

async fn wait_closed(mut closed: watch::Receiver<bool>) {
    while !*closed.borrow_and_update() {
        if closed.changed().await.is_err() {
            return;
        }
    }
}
