//! cachekv - A Bounded LRU Key-Value Cache Server
//!
//! This is the main entry point for the cachekv server.
//! It loads configuration, starts the store and its background threads, and
//! runs the chosen connection dispatcher until Ctrl+C.

use anyhow::Context;
use cachekv::backing::{BackingStore, MemoryBackingStore, NullBackingStore};
use cachekv::commands::CommandHandler;
use cachekv::config::{BackingKind, Config};
use cachekv::connection::{ConnectionStats, DispatchStrategy, Dispatcher};
use cachekv::storage::{
    load_from_file, CacheStore, ExpiryConfig, ExpirySweeper, PersistenceScheduler,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line flags. Each one overrides the matching config file field.
#[derive(Debug, Parser)]
#[command(name = "cachekv", version, about = "A bounded LRU key-value cache server")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (default: 127.0.0.1)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (default: 2000)
    #[arg(short, long)]
    port: Option<u16>,

    /// Connection dispatch strategy
    #[arg(short, long, value_enum)]
    strategy: Option<DispatchStrategy>,

    /// Handler threads (readiness strategy)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Listen backlog
    #[arg(long)]
    backlog: Option<u32>,

    /// Per-connection buffer size in bytes
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Maximum number of cached keys
    #[arg(long)]
    capacity: Option<usize>,

    /// Seconds between expiry sweeps
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Seconds between snapshots
    #[arg(long)]
    persist_interval: Option<u64>,

    /// Snapshot file
    #[arg(long)]
    snapshot_path: Option<PathBuf>,

    /// Restore the snapshot file before serving
    #[arg(long)]
    load_snapshot: bool,

    /// TTL in seconds for values back-filled from the backing store
    #[arg(long)]
    backfill_ttl: Option<u64>,

    /// Backing store behind the cache
    #[arg(long, value_enum)]
    backing: Option<BackingKind>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Applies the flags on top of the config file (or the defaults).
    fn load_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(strategy) = self.strategy {
            config.strategy = strategy;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(backlog) = self.backlog {
            config.backlog = backlog;
        }
        if let Some(buffer_size) = self.buffer_size {
            config.buffer_size = buffer_size;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(secs) = self.sweep_interval {
            config.sweep_interval_secs = secs;
        }
        if let Some(secs) = self.persist_interval {
            config.persist_interval_secs = secs;
        }
        if let Some(path) = self.snapshot_path {
            config.snapshot_path = path;
        }
        if self.load_snapshot {
            config.load_snapshot = true;
        }
        if let Some(secs) = self.backfill_ttl {
            config.backfill_ttl_secs = secs;
        }
        if let Some(backing) = self.backing {
            config.backing = backing;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .init();
}

fn print_banner(config: &Config, addr: std::net::SocketAddr) {
    println!(
        r#"
cachekv v{} - bounded LRU key-value cache
──────────────────────────────────────────────────────────────
Listening on {} ({} strategy, capacity {})
Snapshots: {} every {}s

Use Ctrl+C to shutdown gracefully.
"#,
        cachekv::VERSION,
        addr,
        config.strategy,
        config.capacity,
        config.snapshot_path.display(),
        config.persist_interval_secs,
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().load_config()?;
    init_tracing(&config.log_level);

    // The store is shared by the dispatcher, the sweeper and the snapshotter.
    let store = Arc::new(
        CacheStore::with_capacity(config.capacity).context("failed to start the write queue")?,
    );
    info!(capacity = config.capacity, "Cache store initialized");

    if config.load_snapshot {
        if let Err(e) = load_from_file(&store, &config.snapshot_path) {
            warn!(error = %e, "Snapshot not loaded, starting empty");
        }
    }

    let mut sweeper = ExpirySweeper::start(
        Arc::clone(&store),
        ExpiryConfig {
            interval: config.sweep_interval(),
        },
    )
    .context("failed to start the expiry sweeper")?;

    let mut persistence = PersistenceScheduler::start(
        Arc::clone(&store),
        config.snapshot_path.clone(),
        config.persist_interval(),
    )
    .context("failed to start the snapshot scheduler")?;

    let backing: Arc<dyn BackingStore> = match config.backing {
        BackingKind::None => Arc::new(NullBackingStore),
        BackingKind::Memory => Arc::new(MemoryBackingStore::new()),
    };
    let handler = Arc::new(CommandHandler::new(
        Arc::clone(&store),
        backing,
        config.backfill_ttl(),
    ));
    let stats = Arc::new(ConnectionStats::new());

    let settings = config.dispatcher_settings()?;
    let dispatcher = Dispatcher::bind(&settings, handler, Arc::clone(&stats))?;
    print_banner(&config, dispatcher.local_addr()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(dispatcher.run(shutdown_rx));

    let outcome = tokio::select! {
        finished = &mut server => {
            warn!("Dispatcher stopped on its own");
            finished
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(true);
            (&mut server).await
        }
    };

    // The write queue drains before the final snapshot.
    sweeper.stop();
    store.shutdown_writes();
    persistence.stop();

    let storage = store.stats();
    info!(
        keys = storage.keys,
        gets = storage.get_ops,
        hits = storage.hits,
        misses = storage.misses,
        sets = storage.set_ops,
        deletes = storage.del_ops,
        expired = storage.expired,
        swept = storage.swept,
        evicted = storage.evicted,
        "Store statistics"
    );
    info!(
        accepted = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Connection statistics"
    );

    outcome
        .context("dispatcher task panicked")?
        .context("dispatcher failed")?;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C. If the handler cannot be installed the server keeps
/// running until killed.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, stopping server...");
}
