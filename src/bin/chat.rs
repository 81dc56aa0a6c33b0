//! chat - terminal client for chatd
//!
//! Every line typed is sent to the server; everything the server sends is
//! printed as it arrives.
//!
//! # Usage
//!
//! ```text
//! chat                          # connect to 127.0.0.1:8080
//! chat --addr 10.0.0.5:9000
//! CHAT_ADDR=10.0.0.5:9000 chat
//! ```

use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_client::{ChatClient, ClientConfig, SessionEnd};

// ============================================================================
// CLI Arguments
// ============================================================================

/// chat - terminal client for chatd
#[derive(Parser, Debug)]
#[command(name = "chat", version, about)]
struct Args {
    /// Server address
    #[arg(short, long, env = "CHAT_ADDR", default_value_t = ClientConfig::default().addr)]
    addr: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr and stay quiet unless RUST_LOG asks for more, so they
    // never mix with chat output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("chat_client=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let client = ChatClient::connect(&ClientConfig { addr: args.addr }).await?;

    let cancel_token = client.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_token.cancel();
        }
    });

    let end = client.run().await?;
    info!(?end, "Session ended");
    if end == SessionEnd::ServerClosed {
        eprintln!("disconnected from server");
    }

    Ok(())
}
