// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tether_core::{CacheEntry, CacheStore, Config, Result};

use crate::cli::OutputFormat;
use crate::scheduler::wall_clock_ms;

use super::{format_age, open_store};

/// JSON representation of a cache entry for cache output.
#[derive(Serialize)]
struct CacheEntryJson<'a> {
    data_type: &'a str,
    key: &'a str,
    fresh: bool,
    age_ms: u64,
    ttl_ms: u64,
    synced: bool,
    payload: &'a Value,
}

/// JSON output structure for the cache command.
#[derive(Serialize)]
struct CacheOutputJson<'a> {
    entries: Vec<CacheEntryJson<'a>>,
    swept: usize,
    purged: usize,
}

/// List cached entries, optionally sweeping expired ones first.
pub fn run(config: &Config, store_dir: &Path, sweep: bool, output: OutputFormat) -> Result<()> {
    let store = open_store(store_dir)?;
    let mut cache = CacheStore::new(store, config.data_type_table(), &config.cache);
    let report = cache.restore();
    let now = wall_clock_ms();
    let swept = if sweep { cache.sweep_expired(now) } else { 0 };

    match output {
        OutputFormat::Text => {
            if report.purged > 0 {
                eprintln!("warning: removed {} unreadable cache records", report.purged);
            }
            if sweep {
                println!("Swept {} expired entries.", swept);
            }
            if cache.is_empty() {
                println!("Cache is empty.");
                return Ok(());
            }
            for entry in cache.entries() {
                println!("{}", format_entry(entry, now));
            }
        }
        OutputFormat::Json => {
            let json = CacheOutputJson {
                entries: cache
                    .entries()
                    .map(|e| CacheEntryJson {
                        data_type: &e.data_type,
                        key: &e.key,
                        fresh: !e.is_expired(now),
                        age_ms: e.age(now),
                        ttl_ms: e.ttl_ms,
                        synced: e.synced,
                        payload: &e.payload,
                    })
                    .collect(),
                swept,
                purged: report.purged,
            };
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

/// One text line per cache entry: identity, freshness, age over TTL, sync state.
pub(crate) fn format_entry(entry: &CacheEntry, now: u64) -> String {
    let freshness = if entry.is_expired(now) {
        "stale"
    } else {
        "fresh"
    };
    let sync = if entry.synced { "synced" } else { "local" };
    format!(
        "{}/{}  {}  {}/{}  {}",
        entry.data_type,
        entry.key,
        freshness,
        format_age(entry.age(now)),
        format_age(entry.ttl_ms),
        sync
    )
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
