//! Readiness Dispatcher
//!
//! A single-threaded multiplexer: the listener and every connection task run
//! on the caller's (current-thread) runtime and only ever wait for socket
//! readiness. Request handling is offloaded to a [`WorkerPool`] so a slow
//! handler never stalls other connections.
//!
//! ## Per-Connection Cycle
//!
//! ```text
//!   readable() ── try_read ──> 0 bytes / error ──> close
//!        │
//!        ▼
//!   WorkerPool::process(request) ── reply (oneshot) ──> stage_reply
//!        │
//!        ▼
//!   writable() ── try_write (once) ──> back to readable()
//! ```
//!
//! Each connection task owns its [`ConnectionState`]; nothing else touches it.

use super::{
    accept_backoff, read_once, should_stop, write_once, ConnectionError, ConnectionState,
    ConnectionStats, WorkerPool,
};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

/// Readiness-based dispatcher.
#[derive(Debug)]
pub struct ReadinessDispatcher {
    listener: TcpListener,
    pool: Arc<WorkerPool>,
    buffer_size: usize,
    stats: Arc<ConnectionStats>,
}

impl ReadinessDispatcher {
    pub fn new(
        listener: TcpListener,
        pool: WorkerPool,
        buffer_size: usize,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            listener,
            pool: Arc::new(pool),
            buffer_size,
            stats,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts and serves connections until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError> {
        let mut connections = JoinSet::new();

        if *shutdown.borrow() {
            return Ok(());
        }

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if should_stop(changed, &shutdown) {
                        break;
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        self.stats.connection_opened();
                        debug!(client = %peer, "Accepted connection");
                        connections.spawn(serve_connection(
                            stream,
                            ConnectionState::new(peer, self.buffer_size),
                            Arc::clone(&self.pool),
                            Arc::clone(&self.stats),
                        ));
                    }
                    Err(e) => accept_backoff(&e).await,
                },
                Some(finished) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = finished {
                        warn!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        info!(open = connections.len(), "Readiness dispatcher stopping");
        // A cancelled task never reached its own close bookkeeping.
        connections.abort_all();
        let mut aborted = 0;
        while let Some(finished) = connections.join_next().await {
            if matches!(finished, Err(ref e) if e.is_cancelled()) {
                aborted += 1;
            }
        }
        self.stats.connections_closed(aborted);
        let pool = Arc::clone(&self.pool);
        drop(self);
        // Workers finish their current job before the pool is gone.
        tokio::task::spawn_blocking(move || pool.shutdown())
            .await
            .map_err(|e| ConnectionError::Io(std::io::Error::other(e)))?;
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    mut state: ConnectionState,
    pool: Arc<WorkerPool>,
    stats: Arc<ConnectionStats>,
) {
    let peer = state.peer();

    loop {
        let n = match read_once(&stream, state.begin_read()).await {
            Ok(0) => {
                trace!(client = %peer, "Client closed connection");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(client = %peer, error = %e, "Read failed");
                break;
            }
        };
        stats.bytes_read(n);
        state.finish_read(n);

        let request = Bytes::copy_from_slice(state.request());
        let reply = match pool.process(request).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(client = %peer, error = %e, "Request dropped");
                break;
            }
        };
        stats.command_processed();
        state.stage_reply(reply);

        match write_once(&stream, state.reply()).await {
            Ok(written) => {
                if written < state.reply().len() {
                    trace!(client = %peer, written, staged = state.reply().len(), "Short write");
                }
                stats.bytes_written(written);
            }
            Err(e) => {
                debug!(client = %peer, error = %e, "Write failed");
                break;
            }
        }
        state.finish_write();
    }

    state.close();
    stats.connection_closed();
    debug!(client = %peer, phase = %state.phase(), "Connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::NullBackingStore;
    use crate::commands::{CommandHandler, DEFAULT_BACKFILL_TTL};
    use crate::connection::{Dispatcher, DispatchStrategy, DispatcherSettings, RequestHandler};
    use crate::storage::CacheStore;
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::task::JoinHandle;

    struct TestServer {
        addr: SocketAddr,
        stats: Arc<ConnectionStats>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<Result<(), ConnectionError>>,
    }

    fn start_server(buffer_size: usize) -> TestServer {
        let store = Arc::new(CacheStore::with_capacity(100).unwrap());
        let handler = Arc::new(CommandHandler::new(
            store,
            Arc::new(NullBackingStore),
            DEFAULT_BACKFILL_TTL,
        ));
        start_server_with(handler, buffer_size)
    }

    fn start_server_with(handler: Arc<dyn RequestHandler>, buffer_size: usize) -> TestServer {
        let stats = Arc::new(ConnectionStats::new());
        let settings = DispatcherSettings {
            addr: "127.0.0.1:0".parse().unwrap(),
            strategy: DispatchStrategy::Readiness,
            backlog: 16,
            buffer_size,
            workers: 2,
        };

        let dispatcher = Dispatcher::bind(&settings, handler, Arc::clone(&stats)).unwrap();
        assert_eq!(dispatcher.strategy(), DispatchStrategy::Readiness);
        let addr = dispatcher.local_addr().unwrap();

        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(dispatcher.run(rx));

        TestServer {
            addr,
            stats,
            shutdown,
            task,
        }
    }

    async fn roundtrip(client: &mut TcpStream, request: &str) -> String {
        client.write_all(request.as_bytes()).await.unwrap();
        let mut buf = [0u8; 2048];
        let n = client.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    /// Replies with the request length, to observe input truncation.
    struct Length;

    impl RequestHandler for Length {
        fn handle(&self, request: &[u8]) -> Bytes {
            Bytes::from(request.len().to_string())
        }
    }

    /// Blocks on `release` for a "slow" request; answers anything else at once.
    struct Gated {
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl RequestHandler for Gated {
        fn handle(&self, request: &[u8]) -> Bytes {
            if request.starts_with(b"slow") {
                let _ = self.release.lock().recv();
                Bytes::from("slow done")
            } else {
                Bytes::from("fast")
            }
        }
    }

    #[tokio::test]
    async fn test_set_get() {
        let server = start_server(1024);
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        assert_eq!(roundtrip(&mut client, "set name cachekv").await, "OK");
        assert_eq!(roundtrip(&mut client, "get name").await, "cachekv");
        assert_eq!(roundtrip(&mut client, "get other").await, "NOT_FOUND");
        assert_eq!(roundtrip(&mut client, "del name").await, "OK");
    }

    #[tokio::test]
    async fn test_error_reply_keeps_connection_open() {
        let server = start_server(1024);
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        let reply = roundtrip(&mut client, "bogus").await;
        assert!(reply.starts_with("ERROR: "));
        assert_eq!(roundtrip(&mut client, "get k").await, "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_clients_share_the_store() {
        let server = start_server(1024);
        let mut writer = TcpStream::connect(server.addr).await.unwrap();
        let mut reader = TcpStream::connect(server.addr).await.unwrap();

        assert_eq!(roundtrip(&mut writer, "set shared 1").await, "OK");
        assert_eq!(roundtrip(&mut reader, "get shared").await, "1");
    }

    #[tokio::test]
    async fn test_reply_truncated_to_buffer_size() {
        let server = start_server(16);
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        assert_eq!(roundtrip(&mut client, "set k 0123456789").await, "OK");
        assert_eq!(roundtrip(&mut client, "get k").await, "0123456789");
        assert_eq!(
            roundtrip(&mut client, "set k v 1 2 3 4").await,
            "ERROR: wrong num"
        );
    }

    #[tokio::test]
    async fn test_input_truncated_to_buffer_size() {
        let server = start_server_with(Arc::new(Length), 8);
        let mut client = TcpStream::connect(server.addr).await.unwrap();

        assert_eq!(roundtrip(&mut client, "get k").await, "5");
        // Only the first 8 bytes make up the request.
        assert!(roundtrip(&mut client, "1234567890").await.starts_with('8'));
    }

    #[tokio::test]
    async fn test_slow_request_does_not_stall_other_clients() {
        let (release, gate) = mpsc::channel();
        let handler = Arc::new(Gated {
            release: Mutex::new(gate),
        });
        let server = start_server_with(handler, 64);

        let mut slow = TcpStream::connect(server.addr).await.unwrap();
        slow.write_all(b"slow").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut fast = TcpStream::connect(server.addr).await.unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(2), roundtrip(&mut fast, "ping"))
            .await
            .unwrap();
        assert_eq!(reply, "fast");

        release.send(()).unwrap();
        let mut buf = [0u8; 64];
        let n = tokio::time::timeout(Duration::from_secs(2), slow.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"slow done");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let server = start_server(1024);
        let stats = Arc::clone(&server.stats);

        let mut client = TcpStream::connect(server.addr).await.unwrap();
        roundtrip(&mut client, "set k v").await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 1);
        assert_eq!(stats.bytes_read.load(Ordering::Relaxed), 7);
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 2);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_dispatcher() {
        let server = start_server(1024);
        let mut client = TcpStream::connect(server.addr).await.unwrap();
        roundtrip(&mut client, "set k v").await;

        server.shutdown.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server.task)
            .await
            .unwrap()
            .unwrap();
        tokio_test::assert_ok!(result);
        assert_eq!(server.stats.active_connections.load(Ordering::Relaxed), 0);

        // The open connection was dropped with the dispatcher.
        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).await.unwrap_or(0);
        assert_eq!(n, 0);
    }
}
