//! Standard input/output transport.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::info;

use super::{serve_lines, Connection, ReadLoopExit, StreamConnection, TransportError};
use crate::mcp::dispatcher::Dispatcher;

const STDIO_CONNECTION_ID: u64 = 0;

/// Serves the process's stdin/stdout until stdin reaches end of input.
pub async fn serve_stdio(dispatcher: Dispatcher) -> Result<(), TransportError> {
    serve_stdio_streams(tokio::io::stdin(), tokio::io::stdout(), dispatcher).await
}

/// Runs the stdio pseudo-connection over arbitrary streams.
pub async fn serve_stdio_streams<R, W>(
    input: R,
    output: W,
    dispatcher: Dispatcher,
) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let connection: Arc<dyn Connection> =
        Arc::new(StreamConnection::new(STDIO_CONNECTION_ID, "stdio", output));
    info!("stdio transport ready");

    let exit = serve_lines(input, connection, dispatcher).await?;
    if exit == ReadLoopExit::EndOfInput {
        info!("stdin closed, stopping stdio transport");
    }
    Ok(())
}
