//! TCP listener transport.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinHandle,
};
use tracing::{info, warn};

use super::{serve_lines, Connection, ConnectionRegistry, StreamConnection, TransportError};
use crate::mcp::dispatcher::Dispatcher;

const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// A bound, not yet accepting, TCP listener.
pub struct SocketTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
}

impl SocketTransport {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::LocalAddr { source })?;

        Ok(Self {
            listener,
            local_addr,
            registry: Arc::new(ConnectionRegistry::new()),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns the accept loop. Every accepted connection gets its own framer
    /// and read task.
    pub fn start(self, dispatcher: Dispatcher) -> SocketServerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(&self.registry);
        let local_addr = self.local_addr;

        info!(addr = %local_addr, "socket transport listening");
        let accept_task = tokio::spawn(run_accept_loop(
            self.listener,
            Arc::clone(&registry),
            dispatcher,
            shutdown_rx,
        ));

        SocketServerHandle {
            shutdown,
            accept_task,
            registry,
            local_addr,
        }
    }
}

/// Handle to a running socket transport. Dropping it stops the accept loop but
/// leaves open connections alone; call [`SocketServerHandle::shutdown`] to
/// close them as well.
pub struct SocketServerHandle {
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    registry: Arc<ConnectionRegistry>,
    local_addr: SocketAddr,
}

impl SocketServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Stops accepting, waits for the listener to be released, then force
    /// closes every registered connection.
    pub async fn shutdown(self) -> Result<(), TransportError> {
        self.shutdown.send_replace(true);
        self.accept_task
            .await
            .map_err(|_| TransportError::ListenerPanic)?;

        let closed = self.registry.close_all();
        info!(
            addr = %self.local_addr,
            closed_connections = closed,
            "socket transport stopped"
        );
        Ok(())
    }
}

async fn run_accept_loop(
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher,
    mut shutdown: watch::Receiver<bool>,
) {
    let next_id = AtomicU64::new(1);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let id = next_id.fetch_add(1, Ordering::Relaxed);
                    spawn_connection(stream, peer, id, Arc::clone(&registry), dispatcher.clone());
                }
                Err(error) => {
                    warn!(error = %error, "socket accept error");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            },
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: u64,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Dispatcher,
) {
    let (reader, writer) = stream.into_split();
    let connection: Arc<dyn Connection> =
        Arc::new(StreamConnection::new(id, peer.to_string(), writer));
    registry.add(Arc::clone(&connection));
    info!(connection = id, peer = %peer, "connection accepted");

    tokio::spawn(async move {
        let outcome = serve_lines(reader, Arc::clone(&connection), dispatcher).await;
        registry.remove(id);
        match outcome {
            Ok(exit) => info!(connection = id, peer = %peer, reason = ?exit, "connection closed"),
            Err(error) => warn!(
                connection = id,
                peer = %peer,
                error = %error,
                "connection dropped after transport error"
            ),
        }
    });
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
        time::timeout,
    };

    use super::*;
    use crate::mcp::{
        dispatcher::RpcHandler,
        rpc::{Response, RpcError, PARSE_ERROR},
    };

    const WAIT: Duration = Duration::from_secs(5);

    struct SleepyEcho;

    #[async_trait]
    impl RpcHandler for SleepyEcho {
        async fn handle(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
            if method == "slow" {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            Ok(params.unwrap_or(Value::Null))
        }
    }

    async fn start_server() -> SocketServerHandle {
        let addr = "127.0.0.1:0".parse().expect("valid addr");
        let transport = SocketTransport::bind(addr).await.expect("bind listener");
        transport.start(Dispatcher::new(Arc::new(SleepyEcho)))
    }

    async fn read_response(reader: &mut BufReader<TcpStream>) -> Response {
        let mut line = String::new();
        timeout(WAIT, reader.read_line(&mut line))
            .await
            .expect("response within timeout")
            .expect("read response");
        serde_json::from_str(line.trim_end()).expect("valid response line")
    }

    async fn wait_for_connections(handle: &SocketServerHandle, expected: usize) {
        timeout(WAIT, async {
            while handle.registry().len() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry should reach expected size");
    }

    #[tokio::test]
    async fn answers_requests_split_across_writes() {
        let handle = start_server().await;
        let stream = TcpStream::connect(handle.local_addr()).await.expect("connect");
        let mut reader = BufReader::new(stream);

        let request = br#"{"jsonrpc":"2.0","id":42,"method":"echo","params":{"note":"split"}}"#;
        let (head, tail) = request.split_at(17);
        reader.get_mut().write_all(head).await.expect("write head");
        reader.get_mut().flush().await.expect("flush");
        tokio::time::sleep(Duration::from_millis(20)).await;
        reader.get_mut().write_all(tail).await.expect("write tail");
        reader.get_mut().write_all(b"\n{not json\n").await.expect("write rest");

        let first = read_response(&mut reader).await;
        let second = read_response(&mut reader).await;
        let (echo, parse_failure) = if first.id == json!(42) {
            (first, second)
        } else {
            (second, first)
        };

        assert_eq!(echo.result(), Some(&json!({"note": "split"})));
        assert_eq!(parse_failure.id, Value::Null);
        assert_eq!(
            parse_failure.error().map(|error| error.code),
            Some(PARSE_ERROR)
        );

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn slow_request_does_not_block_later_lines() {
        let handle = start_server().await;
        let stream = TcpStream::connect(handle.local_addr()).await.expect("connect");
        let mut reader = BufReader::new(stream);

        reader
            .get_mut()
            .write_all(
                b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"slow\"}\n{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"fast\"}\n",
            )
            .await
            .expect("write batch of lines");

        let first = read_response(&mut reader).await;
        let second = read_response(&mut reader).await;
        assert_eq!(first.id, json!(2));
        assert_eq!(second.id, json!(1));

        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn disconnect_removes_connection_from_registry() {
        let handle = start_server().await;
        let stream = TcpStream::connect(handle.local_addr()).await.expect("connect");
        wait_for_connections(&handle, 1).await;

        drop(stream);

        wait_for_connections(&handle, 0).await;
        handle.shutdown().await.expect("shutdown");
    }

    #[tokio::test]
    async fn shutdown_closes_connections_and_stops_accepting() {
        let handle = start_server().await;
        let addr = handle.local_addr();
        let mut first = TcpStream::connect(addr).await.expect("connect first");
        let mut second = TcpStream::connect(addr).await.expect("connect second");
        wait_for_connections(&handle, 2).await;

        let registry = Arc::clone(handle.registry());
        handle.shutdown().await.expect("shutdown");

        assert!(registry.is_empty());
        for stream in [&mut first, &mut second] {
            let mut buf = [0_u8; 16];
            let read = timeout(WAIT, stream.read(&mut buf))
                .await
                .expect("peer should observe close");
            assert!(matches!(read, Ok(0) | Err(_)));
        }
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
