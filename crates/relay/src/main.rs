// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-relay: development WebSocket relay for tether clients.
//!
//! Greets every client with a `connected` frame, answers `ping` heartbeats
//! with `pong`, and fans every other text frame out to the remaining clients.

mod server;
mod state;

use clap::Parser;
use std::net::SocketAddr;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// tether-relay: push relay for exercising tether connections
#[derive(Parser, Debug)]
#[command(name = "tether-relay")]
#[command(about = "WebSocket relay for exercising tether connections end to end")]
struct Args {
    /// Address to bind the server to
    #[arg(short, long, default_value = "127.0.0.1:7890")]
    bind: SocketAddr,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting tether-relay");
    info!("  Bind address: {}", args.bind);

    server::run(args.bind, state::RelayState::new()).await?;

    Ok(())
}
