// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tether_core::config::CONFIG_FILE_NAME;

/// Parse a string that must not be empty or whitespace-only.
fn non_empty_string(s: &str) -> Result<String, String> {
    if s.trim().is_empty() {
        Err("cannot be empty".to_string())
    } else {
        Ok(s.to_string())
    }
}

/// Output format for commands supporting structured output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "tether")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Resilient push connections and offline-first sync for point-of-sale clients")]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, value_name = "path", default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Append logs to a file instead of stderr
    #[arg(long, global = true, value_name = "path")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print messages pushed on a configured connection until Ctrl-C
    #[command(after_help = "\
Examples:
  tether listen tables                 Follow the 'tables' connection
  tether listen kds -c pos.toml        Use another configuration file")]
    Listen {
        /// Connection name from the configuration file
        #[arg(value_parser = non_empty_string)]
        name: String,
    },

    /// Send one message on a configured connection
    #[command(after_help = "\
Examples:
  tether send tables '{\"table\":4,\"status\":\"seated\"}'")]
    Send {
        /// Connection name from the configuration file
        #[arg(value_parser = non_empty_string)]
        name: String,

        /// Message text
        message: String,

        /// Seconds to wait for the connection to open and flush
        #[arg(long, default_value = "10", value_name = "secs")]
        wait: u64,
    },

    /// List queued mutations in drain order
    Queue {
        /// Directory of the persistent store
        #[arg(long, value_name = "dir")]
        store: PathBuf,

        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// List cached entries with their freshness
    Cache {
        /// Directory of the persistent store
        #[arg(long, value_name = "dir")]
        store: PathBuf,

        /// Remove expired entries first
        #[arg(long)]
        sweep: bool,

        #[arg(short, long, value_enum, default_value_t)]
        output: OutputFormat,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Load and validate the configuration file
    Check,
}

#[cfg(test)]
#[path = "../cli_tests/mod.rs"]
mod tests;
