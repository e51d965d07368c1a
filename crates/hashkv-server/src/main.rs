//! `hashkv-server` binary.
//!
//! ```bash
//! hashkv-server --bind 127.0.0.1:6379 --aof /var/lib/hashkv/database.aof
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use hashkv_core::{Config, Engine};
use hashkv_server::{shutdown_on_signal, Server};

/// Command-line arguments for the server.
#[derive(Parser, Debug)]
#[command(author, version, about = "Redis-like key-value server with AOF durability")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:6379")]
    bind: SocketAddr,

    /// Append-only log file, replayed at startup
    #[arg(long, default_value = "database.aof")]
    aof: PathBuf,

    /// Background AOF fsync interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    sync_interval_ms: u64,

    /// Initial bucket count of the hash field store
    #[arg(long, default_value_t = 100)]
    buckets: usize,

    /// Records per bucket before insertion starts evicting
    #[arg(long, default_value_t = 4)]
    bucket_capacity: usize,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = Config {
        initial_buckets: args.buckets,
        bucket_capacity: args.bucket_capacity,
        aof_path: args.aof.clone(),
        sync_interval: Duration::from_millis(args.sync_interval_ms),
        ..Config::server()
    };

    let engine = Engine::open(config)
        .with_context(|| format!("failed to open or replay AOF at {}", args.aof.display()))?;
    let engine = Arc::new(engine);

    let server = Server::bind(args.bind, Arc::clone(&engine))
        .with_context(|| format!("failed to bind {}", args.bind))?;
    shutdown_on_signal(server.shutdown_handle()).context("failed to install signal handlers")?;
    info!(bind = %args.bind, aof = %args.aof.display(), "hashkv-server started");

    server.run().context("accept loop failed")?;
    engine.close().context("failed to close AOF")?;
    info!("hashkv-server stopped");
    Ok(())
}
