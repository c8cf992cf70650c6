// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

pub mod cache;
pub mod config;
pub mod listen;
pub mod queue;
pub mod send;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tether_core::{Config, FileStore, Result};

/// Loads the configuration file.
///
/// Offline inspection commands fall back to defaults when the file does
/// not exist; commands that open connections need it (`required`).
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    if !required && !path.exists() {
        tracing::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    Config::load(path)
}

/// Opens the persistent store backing the cache and mutation queue.
pub fn open_store(dir: &Path) -> Result<Arc<FileStore>> {
    Ok(Arc::new(FileStore::open(dir)?))
}

/// Renders milliseconds since Unix epoch as an RFC 3339 UTC timestamp.
pub(crate) fn format_millis(ms: u64) -> String {
    i64::try_from(ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}

/// Renders a duration in milliseconds the short way (`850ms`, `12s`, `3m`, `2h`).
pub(crate) fn format_age(ms: u64) -> String {
    match ms {
        0..=999 => format!("{ms}ms"),
        1_000..=59_999 => format!("{}s", ms / 1_000),
        60_000..=3_599_999 => format!("{}m", ms / 60_000),
        _ => format!("{}h", ms / 3_600_000),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
