//! Connection Dispatcher Module
//!
//! This module accepts TCP clients and moves bytes between their sockets and a
//! [`RequestHandler`]. Two interchangeable strategies sit behind the single
//! [`Dispatcher`] interface; the strategy is chosen at startup.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────────┐
//!                    │   TcpListener (bounded backlog)  │
//!                    └────────────────┬─────────────────┘
//!                                     │
//!              ┌──────────────────────┴───────────────────────┐
//!              ▼                                              ▼
//! ┌───────────────────────────┐              ┌───────────────────────────────┐
//! │  Readiness                │              │  Completion                   │
//! │                           │              │                               │
//! │  task per connection      │              │  one loop, JoinSet of ops     │
//! │  readable -> try_read     │              │  Accept / Recv / Send         │
//! │  WorkerPool (N threads)   │              │  handler runs on the loop     │
//! │  writable -> try_write    │              │  buffers travel with the op   │
//! └───────────────────────────┘              └───────────────────────────────┘
//! ```
//!
//! ## Behaviour Shared by Both Strategies
//!
//! - One read is one request; there is no framing.
//! - Reads and writes are single-shot and bounded by the buffer size. Longer
//!   input is cut at the buffer size, and so is a longer reply.
//! - A read of 0 bytes or any socket error closes only that connection.
//! - Shutdown is signalled through a `watch` channel.
//!
//! ## Example
//!
//! ```ignore
//! let settings = DispatcherSettings::default();
//! let dispatcher = Dispatcher::bind(&settings, handler, stats)?;
//! let (tx, rx) = tokio::sync::watch::channel(false);
//! tokio::spawn(dispatcher.run(rx));
//! // ...
//! tx.send(true)?;
//! ```

pub mod completion;
pub mod pool;
pub mod readiness;
pub mod state;

pub use completion::CompletionDispatcher;
pub use pool::WorkerPool;
pub use readiness::ReadinessDispatcher;
pub use state::{ConnectionState, Phase};

use bytes::Bytes;
use serde::Deserialize;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tracing::{error, info};

/// Default size of each connection's read and write buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 128;

/// Pause after a failed accept before accepting again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Turns one request into one reply.
///
/// Implementations are shared between threads and called concurrently.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: &[u8]) -> Bytes;
}

/// Which I/O model drives the connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStrategy {
    /// Readiness notifications plus a worker pool
    #[default]
    Readiness,
    /// A submission/completion loop
    Completion,
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStrategy::Readiness => f.write_str("readiness"),
            DispatchStrategy::Completion => f.write_str("completion"),
        }
    }
}

/// Listener and buffer settings for a dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub addr: SocketAddr,
    pub strategy: DispatchStrategy,
    pub backlog: u32,
    pub buffer_size: usize,
    /// Worker threads (readiness only)
    pub workers: usize,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 2000)),
            strategy: DispatchStrategy::default(),
            backlog: DEFAULT_BACKLOG,
            buffer_size: DEFAULT_BUFFER_SIZE,
            workers: 4,
        }
    }
}

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total requests answered
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Closes connections torn down together, e.g. at shutdown.
    pub fn connections_closed(&self, count: usize) {
        self.active_connections
            .fetch_sub(count as u64, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Errors that can occur while dispatching connections.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The listening socket could not be set up
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The worker pool has shut down
    #[error("worker pool is closed")]
    PoolClosed,
}

/// A bound listener plus the strategy that will serve it.
#[derive(Debug)]
pub enum Dispatcher {
    Readiness(ReadinessDispatcher),
    Completion(CompletionDispatcher),
}

impl Dispatcher {
    /// Binds the listener and prepares the chosen strategy.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn bind(
        settings: &DispatcherSettings,
        handler: Arc<dyn RequestHandler>,
        stats: Arc<ConnectionStats>,
    ) -> Result<Self, ConnectionError> {
        let listener = bind_listener(settings.addr, settings.backlog)?;

        let dispatcher = match settings.strategy {
            DispatchStrategy::Readiness => {
                let pool = WorkerPool::new(settings.workers, handler)?;
                Dispatcher::Readiness(ReadinessDispatcher::new(
                    listener,
                    pool,
                    settings.buffer_size,
                    stats,
                ))
            }
            DispatchStrategy::Completion => Dispatcher::Completion(CompletionDispatcher::new(
                listener,
                handler,
                settings.buffer_size,
                stats,
            )),
        };

        info!(
            addr = %settings.addr,
            strategy = %settings.strategy,
            backlog = settings.backlog,
            "Listening"
        );
        Ok(dispatcher)
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Dispatcher::Readiness(d) => d.local_addr(),
            Dispatcher::Completion(d) => d.local_addr(),
        }
    }

    pub fn strategy(&self) -> DispatchStrategy {
        match self {
            Dispatcher::Readiness(_) => DispatchStrategy::Readiness,
            Dispatcher::Completion(_) => DispatchStrategy::Completion,
        }
    }

    /// Serves connections until `shutdown` turns true or its sender is
    /// dropped. Open connections are dropped on the way out.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError> {
        match self {
            Dispatcher::Readiness(d) => d.run(shutdown).await,
            Dispatcher::Completion(d) => d.run(shutdown).await,
        }
    }
}

/// Binds `addr` with `SO_REUSEADDR` and a bounded listen backlog.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> Result<TcpListener, ConnectionError> {
    let bind = || -> io::Result<TcpListener> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        socket.listen(backlog)
    };
    bind().map_err(|source| ConnectionError::Bind { addr, source })
}

/// Whether a watch update means "stop".
fn should_stop(
    changed: Result<(), watch::error::RecvError>,
    shutdown: &watch::Receiver<bool>,
) -> bool {
    changed.is_err() || *shutdown.borrow()
}

/// Logs a failed accept and waits [`ACCEPT_BACKOFF`] before the next one.
async fn accept_backoff(e: &io::Error) {
    error!(error = %e, "Failed to accept connection");
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

/// Waits for read readiness and performs one non-blocking read.
async fn read_once(stream: &TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        stream.readable().await?;
        match stream.try_read(buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            result => return result,
        }
    }
}

/// Waits for write readiness and performs one non-blocking write. A short
/// write is not retried.
async fn write_once(stream: &TcpStream, buf: &[u8]) -> io::Result<usize> {
    loop {
        stream.writable().await?;
        match stream.try_write(buf) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            result => return result,
        }
    }
}
