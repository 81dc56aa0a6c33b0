//! chatd - multi-client TCP chat server
//!
//! Runs the reactor in the foreground until SIGINT or SIGTERM.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:8080 with 4 workers
//! chatd
//!
//! # Custom port and pool size (flags win over env and config file)
//! chatd --port 9000 --pool-size 8
//! CHAT_PORT=9000 chatd
//!
//! # Layer a TOML file over the defaults
//! chatd --config /etc/chatd.toml
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use chatd::{ChatServer, ServerConfig, ShutdownHandle};

/// chatd - multi-client TCP chat server
#[derive(Parser, Debug)]
#[command(name = "chatd", version, about)]
struct Args {
    /// TOML config file layered over the defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "CHAT_PORT")]
    port: Option<u16>,

    /// Number of worker threads
    #[arg(short = 'w', long, env = "CHAT_POOL_SIZE")]
    pool_size: Option<usize>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<IpAddr>,
}

impl Args {
    /// Defaults, then the config file, then env and flags.
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(bind) = self.bind {
            config.bind_addr = bind;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging() {
        eprintln!("Failed to initialise logging: {e}");
        process::exit(1);
    }

    if let Err(e) = run(&args) {
        error!(error = %format!("{e:#}"), "chatd failed");
        process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chatd=info".parse()?)
                .add_directive("chat_core=info".parse()?)
                .add_directive("chat_protocol=info".parse()?),
        )
        .init();
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = args.server_config()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "chatd starting"
    );

    let server = ChatServer::bind(config).context("Failed to start server")?;
    spawn_signal_listener(server.shutdown_handle())?;

    server.run()?;

    info!("chatd stopped");
    Ok(())
}

/// Waits for SIGINT/SIGTERM on a helper thread and requests shutdown.
fn spawn_signal_listener(handle: ShutdownHandle) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    thread::Builder::new()
        .name("chatd-signals".to_string())
        .spawn(move || {
            if let Err(e) = runtime.block_on(wait_for_shutdown_signal()) {
                error!(error = %e, "Error waiting for shutdown signal");
                return;
            }
            info!("Shutdown signal received");
            handle.shutdown();
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
