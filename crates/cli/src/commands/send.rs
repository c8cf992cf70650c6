// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tether_core::{Config, Error, Result};
use tracing::{info, warn};

use crate::connection::{ConnectionManager, ConnectionState, SendOptions};
use crate::transport::{Connector, WebSocketConnector};

/// Interval between flush checks while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Send one message, waiting up to `wait` for it to leave the outbound queue.
pub async fn run(config: &Config, name: &str, message: String, wait: Duration) -> Result<()> {
    let connector = Arc::new(WebSocketConnector::new());
    deliver(connector, config, name, message, wait).await
}

pub(crate) async fn deliver(
    connector: Arc<dyn Connector>,
    config: &Config,
    name: &str,
    message: String,
    wait: Duration,
) -> Result<()> {
    let conn = config.connection(name)?.clone();
    let manager = ConnectionManager::new(connector, &config.manager);

    // A failed first attempt still leaves the connection reconnecting.
    if let Err(e) = manager.create_connection(name, conn).await {
        warn!("{}; queueing message", e);
    }
    manager.send(name, message, SendOptions::default()).await?;

    let flushed = tokio::time::timeout(wait, async {
        loop {
            match manager.stats(name) {
                Ok(stats) if stats.state == ConnectionState::Open && stats.queued == 0 => {
                    return true;
                }
                Ok(stats) if stats.state.is_terminal() => return false,
                Err(_) => return false,
                Ok(_) => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    })
    .await
    .unwrap_or(false);

    manager.close_all().await;
    if flushed {
        info!("message sent on '{}'", name);
        Ok(())
    } else {
        Err(Error::ConnectionTimeout {
            name: name.to_string(),
            timeout_ms: u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
#[path = "send_tests.rs"]
mod tests;
