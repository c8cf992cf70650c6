// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether - Resilient push connections and offline-first sync for
//! point-of-sale clients.
//!
//! # Main Components
//!
//! - [`ConnectionManager`] - pooled duplex connections with heartbeat,
//!   exponential-backoff reconnection and an outbound queue replayed on reconnect
//! - [`SyncManager`] - TTL cache plus a durable, priority-ordered mutation
//!   queue drained whenever the remote system is reachable, with per data
//!   type conflict resolution
//! - [`transport`] - the channel and request seams, with a WebSocket connector
//! - [`scheduler`] - the timer seam both managers sleep through
//!
//! # Wiring
//!
//! ```rust,ignore
//! use tether::{ConnectionManager, SyncManager, WebSocketConnector};
//!
//! let config = tether_core::Config::load(Path::new("tether.toml"))?;
//! let connections = ConnectionManager::new(Arc::new(WebSocketConnector::new()), &config.manager);
//! connections.create_connection("tables", config.connection("tables")?.clone()).await?;
//!
//! let sync = Arc::new(SyncManager::new(http, store, &config));
//! sync.restore();
//! let _link = sync.link_connectivity(&connections, "tables")?;
//! ```

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

mod cli;
mod commands;
pub mod connection;
pub mod logging;
pub mod scheduler;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod test_helpers;

pub use cli::{Cli, Command, ConfigCommand, OutputFormat};
pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, ConnectionStats, EventHandlers,
    SendOptions, Subscription,
};
pub use scheduler::{Scheduler, TimerHandle, TokioScheduler};
pub use sync::{DrainReport, GetOptions, MutationOutcome, SetOptions, SyncEvent, SyncManager};
pub use tether_core::{Error, Result};
pub use transport::{Connector, RequestTransport, WebSocketConnector};

/// Locks a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Execute a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Listen { name } => {
            let config = commands::load_config(&cli.config, true)?;
            commands::listen::run(&config, &name).await
        }
        Command::Send {
            name,
            message,
            wait,
        } => {
            let config = commands::load_config(&cli.config, true)?;
            commands::send::run(&config, &name, message, Duration::from_secs(wait)).await
        }
        Command::Queue { store, output } => commands::queue::run(&store, output),
        Command::Cache {
            store,
            sweep,
            output,
        } => {
            let config = commands::load_config(&cli.config, false)?;
            commands::cache::run(&config, &store, sweep, output)
        }
        Command::Config(cmd) => commands::config::run(cmd, &cli.config),
    }
}
