//! Completion Dispatcher
//!
//! A single submission/completion loop. Every socket operation is submitted as
//! an owned, in-flight operation; the loop only ever reacts to the next
//! operation that completes and decides what to submit after it.
//!
//! ## Operations
//!
//! ```text
//!   Accept ──ok──> register connection, submit Recv ──┐
//!     ▲    └─err─> log ───────────────────────────────┤
//!     └──────────── always re-submit Accept <─────────┘
//!
//!   Recv  ── 0 / err ──> close
//!         ── n > 0  ───> handler (on this thread) ──> submit Send
//!
//!   Send  ── err ──> close
//!         ── ok  ──> clear buffers ──> submit Recv
//! ```
//!
//! A [`JoinSet`] plays the role of the ring: spawning an operation is a
//! submission, `join_next` yields completions. The socket and its
//! [`ConnectionState`] (and with it both buffers) are moved into the operation
//! and handed back in its [`Completion`], so no buffer is reachable by two
//! operations at once.

use super::{
    accept_backoff, read_once, should_stop, write_once, ConnectionError, ConnectionState,
    ConnectionStats, RequestHandler,
};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

/// A finished operation and whatever it owned.
#[derive(Debug)]
enum Completion {
    Accept(io::Result<(TcpStream, SocketAddr)>),
    Recv {
        stream: TcpStream,
        state: ConnectionState,
        result: io::Result<usize>,
    },
    Send {
        stream: TcpStream,
        state: ConnectionState,
        result: io::Result<usize>,
    },
}

async fn accept(listener: Arc<TcpListener>) -> Completion {
    Completion::Accept(listener.accept().await)
}

/// Re-submission after a failed accept.
async fn accept_after_error(listener: Arc<TcpListener>, e: io::Error) -> Completion {
    accept_backoff(&e).await;
    accept(listener).await
}

async fn recv(stream: TcpStream, mut state: ConnectionState) -> Completion {
    let result = read_once(&stream, state.begin_read()).await;
    Completion::Recv {
        stream,
        state,
        result,
    }
}

async fn send(stream: TcpStream, state: ConnectionState) -> Completion {
    let result = write_once(&stream, state.reply()).await;
    Completion::Send {
        stream,
        state,
        result,
    }
}

/// Completion-based dispatcher.
pub struct CompletionDispatcher {
    listener: Arc<TcpListener>,
    handler: Arc<dyn RequestHandler>,
    buffer_size: usize,
    stats: Arc<ConnectionStats>,
}

impl CompletionDispatcher {
    pub fn new(
        listener: TcpListener,
        handler: Arc<dyn RequestHandler>,
        buffer_size: usize,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        Self {
            listener: Arc::new(listener),
            handler,
            buffer_size,
            stats,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the loop until shutdown is signalled.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ConnectionError> {
        let mut ring: JoinSet<Completion> = JoinSet::new();
        // Connections with an operation in the ring
        let mut open = 0usize;

        if *shutdown.borrow() {
            return Ok(());
        }
        ring.spawn(accept(Arc::clone(&self.listener)));

        loop {
            let completion = tokio::select! {
                changed = shutdown.changed() => {
                    if should_stop(changed, &shutdown) {
                        break;
                    }
                    continue;
                }
                next = ring.join_next() => match next {
                    Some(Ok(completion)) => completion,
                    Some(Err(e)) => {
                        warn!(error = %e, "In-flight operation failed");
                        continue;
                    }
                    None => break,
                },
            };

            match completion {
                Completion::Accept(result) => {
                    let listener = Arc::clone(&self.listener);
                    match result {
                        Ok((stream, peer)) => {
                            self.stats.connection_opened();
                            open += 1;
                            debug!(client = %peer, "Accepted connection");
                            let state = ConnectionState::new(peer, self.buffer_size);
                            ring.spawn(recv(stream, state));
                            ring.spawn(accept(listener));
                        }
                        Err(e) => {
                            ring.spawn(accept_after_error(listener, e));
                        }
                    }
                }
                Completion::Recv {
                    stream,
                    mut state,
                    result,
                } => match result {
                    Ok(n) if n > 0 => {
                        self.stats.bytes_read(n);
                        state.finish_read(n);
                        let reply = self.handler.handle(state.request());
                        self.stats.command_processed();
                        state.stage_reply(reply);
                        ring.spawn(send(stream, state));
                    }
                    Ok(_) => {
                        trace!(client = %state.peer(), "Client closed connection");
                        self.close(state);
                        open -= 1;
                    }
                    Err(e) => {
                        debug!(client = %state.peer(), error = %e, "Read failed");
                        self.close(state);
                        open -= 1;
                    }
                },
                Completion::Send {
                    stream,
                    mut state,
                    result,
                } => match result {
                    Ok(written) => {
                        if written < state.reply().len() {
                            trace!(
                                client = %state.peer(),
                                written,
                                staged = state.reply().len(),
                                "Short write"
                            );
                        }
                        self.stats.bytes_written(written);
                        state.finish_write();
                        ring.spawn(recv(stream, state));
                    }
                    Err(e) => {
                        debug!(client = %state.peer(), error = %e, "Write failed");
                        self.close(state);
                        open -= 1;
                    }
                },
            }
        }

        info!(in_flight = ring.len(), open, "Completion dispatcher stopping");
        ring.shutdown().await;
        self.stats.connections_closed(open);
        Ok(())
    }

    fn close(&self, mut state: ConnectionState) {
        state.close();
        self.stats.connection_closed();
        debug!(client = %state.peer(), phase = %state.phase(), "Connection closed");
    }
}

impl std::fmt::Debug for CompletionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionDispatcher")
            .field("listener", &self.listener)
            .field("buffer_size", &self.buffer_size)
            .finish_non_exhaustive()
    }
}
