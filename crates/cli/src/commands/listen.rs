// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::future::Future;
use std::sync::Arc;

use tether_core::{Config, Error, Result};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::connection::{ConnectionManager, EventHandlers};
use crate::transport::{Connector, WebSocketConnector};

/// Print every message pushed on `name` until Ctrl-C.
pub async fn run(config: &Config, name: &str) -> Result<()> {
    let connector = Arc::new(WebSocketConnector::new());
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    follow(connector, config, name, |text| println!("{}", text), shutdown).await
}

/// Delivers messages to `on_message` until `shutdown` resolves or the
/// connection gives up reconnecting.
pub(crate) async fn follow(
    connector: Arc<dyn Connector>,
    config: &Config,
    name: &str,
    on_message: impl Fn(&str) + Send + Sync + 'static,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let conn = config.connection(name)?.clone();
    let max_attempts = conn.max_reconnect_attempts;
    let manager = ConnectionManager::new(connector, &config.manager);

    let gave_up = Arc::new(Notify::new());
    let label = name.to_string();
    let handlers = EventHandlers::new()
        .on_message(on_message)
        .on_state_change(move |from, to| info!("{}: {} -> {}", label, from, to))
        .on_max_attempts({
            let gave_up = Arc::clone(&gave_up);
            move |_| gave_up.notify_one()
        });

    // Handlers stay registered when the first attempt fails.
    let _subscription = match manager.create_connection_with(name, conn, handlers).await {
        Ok(subscription) => Some(subscription),
        Err(e) => {
            warn!("{}", e);
            None
        }
    };

    let result = tokio::select! {
        _ = shutdown => Ok(()),
        _ = gave_up.notified() => Err(Error::MaxReconnectAttemptsReached {
            name: name.to_string(),
            attempts: max_attempts,
        }),
    };
    manager.close_all().await;
    result
}

#[cfg(test)]
#[path = "listen_tests.rs"]
mod tests;
