// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use tether_core::{Config, Result};

use crate::cli::ConfigCommand;

use super::load_config;

/// Execute a config subcommand.
pub fn run(cmd: ConfigCommand, path: &Path) -> Result<()> {
    match cmd {
        ConfigCommand::Check => {
            let config = load_config(path, true)?;
            println!("{} is valid", path.display());
            for line in summarize(&config) {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

/// Human-readable summary of the effective configuration.
pub(crate) fn summarize(config: &Config) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push(format!(
        "connections ({} of max {}):",
        config.connections.len(),
        config.manager.max_connections
    ));
    for (name, conn) in &config.connections {
        let heartbeat = match conn.heartbeat_interval_ms {
            0 => "off".to_string(),
            ms => format!("{}ms", ms),
        };
        lines.push(format!(
            "  {}  {}  heartbeat {}  retries {}",
            name, conn.url, heartbeat, conn.max_reconnect_attempts
        ));
    }
    lines.push(format!(
        "sync: {}  max retries {}",
        config.sync.base_url, config.sync.max_retries
    ));
    lines.push("data types:".to_string());
    for (name, dt) in config.data_type_table().iter() {
        lines.push(format!(
            "  {}  ttl {}ms  priority {}  {}",
            name, dt.ttl_ms, dt.priority, dt.conflict_policy
        ));
    }
    lines
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
