// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per data type cache with TTL and priority-aware eviction.
//!
//! Entries are held in memory and written through to a [`KeyValueStore`]
//! under `cache:<data_type>:<key>` so they survive a restart.
//!
//! Eviction order when over capacity:
//! 1. Expired entries
//! 2. Less important data types (larger priority number)
//! 3. Fewer recorded accesses
//! 4. Older timestamp
//!
//! The entry being written is never evicted by its own insertion.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{CacheConfig, DataTypeTable};
use crate::error::Error;
use crate::store::KeyValueStore;

/// Store key prefix for persisted cache entries.
pub const CACHE_PREFIX: &str = "cache:";

/// A cached payload for one (data type, key) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub data_type: String,
    pub key: String,
    pub payload: Value,
    /// When the payload was written, in milliseconds since Unix epoch.
    pub timestamp: u64,
    pub ttl_ms: u64,
    /// False while a local edit has not reached the remote system.
    pub synced: bool,
    /// Optional version or source tag reported by the remote system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub access_count: u64,
    #[serde(default)]
    pub last_access: u64,
}

impl CacheEntry {
    /// Milliseconds elapsed since the entry was written.
    pub fn age(&self, now: u64) -> u64 {
        now.saturating_sub(self.timestamp)
    }

    /// True once the entry's age exceeds its TTL.
    pub fn is_expired(&self, now: u64) -> bool {
        self.age(now) > self.ttl_ms
    }

    /// Milliseconds since Unix epoch after which the entry is stale.
    pub fn expires_at(&self) -> u64 {
        self.timestamp.saturating_add(self.ttl_ms)
    }

    fn store_key(&self) -> String {
        store_key(&self.data_type, &self.key)
    }
}

fn store_key(data_type: &str, key: &str) -> String {
    format!("{CACHE_PREFIX}{data_type}:{key}")
}

type EntryId = (String, String);

/// Counters describing cache behavior since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired_removed: u64,
}

/// Result of reloading entries from the persistent store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub loaded: usize,
    /// Unreadable records removed from the store.
    pub purged: usize,
}

/// In-memory cache with write-through persistence.
pub struct CacheStore {
    entries: BTreeMap<EntryId, CacheEntry>,
    store: Arc<dyn KeyValueStore>,
    types: DataTypeTable,
    max_entries: usize,
    stats: CacheStats,
}

impl CacheStore {
    /// Creates an empty cache. Call [`CacheStore::restore`] to reload
    /// persisted entries.
    pub fn new(store: Arc<dyn KeyValueStore>, types: DataTypeTable, config: &CacheConfig) -> Self {
        CacheStore {
            entries: BTreeMap::new(),
            store,
            types,
            max_entries: config.max_entries.max(1),
            stats: CacheStats::default(),
        }
    }

    /// The data type table this cache uses for TTLs and priorities.
    pub fn types(&self) -> &DataTypeTable {
        &self.types
    }

    /// Reloads persisted entries, purging records that fail to parse.
    pub fn restore(&mut self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let keys = match self.store.keys_with_prefix(CACHE_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("cache restore skipped, store unavailable: {}", e);
                return report;
            }
        };

        for store_key in keys {
            let raw = match self.store.get(&store_key) {
                Ok(Some(raw)) => raw,
                Ok(None) => continue,
                Err(e) => {
                    warn!("failed to read {}: {}", store_key, e);
                    continue;
                }
            };
            match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) => {
                    self.entries
                        .insert((entry.data_type.clone(), entry.key.clone()), entry);
                    report.loaded += 1;
                }
                Err(e) => {
                    let err = Error::CacheCorrupt {
                        key: store_key.clone(),
                        reason: e.to_string(),
                    };
                    warn!("{}; purging", err);
                    if let Err(e) = self.store.remove(&store_key) {
                        warn!("failed to purge {}: {}", store_key, e);
                    }
                    report.purged += 1;
                }
            }
        }

        debug!(
            "cache restored: {} loaded, {} purged",
            report.loaded, report.purged
        );
        report
    }

    /// Returns the payload for a key.
    ///
    /// Expired entries are reported as absent unless `allow_stale` is set.
    /// A successful read counts as an access for eviction purposes.
    pub fn get(&mut self, data_type: &str, key: &str, now: u64, allow_stale: bool) -> Option<CacheEntry> {
        let id = (data_type.to_string(), key.to_string());
        let Some(entry) = self.entries.get_mut(&id) else {
            self.stats.misses += 1;
            return None;
        };

        if entry.is_expired(now) {
            if !allow_stale {
                self.stats.misses += 1;
                return None;
            }
            self.stats.stale_hits += 1;
        } else {
            self.stats.hits += 1;
        }

        entry.access_count += 1;
        entry.last_access = now;
        Some(entry.clone())
    }

    /// Returns an entry without counting an access or checking freshness.
    pub fn peek(&self, data_type: &str, key: &str) -> Option<&CacheEntry> {
        self.entries.get(&(data_type.to_string(), key.to_string()))
    }

    /// Writes a payload with the data type's configured TTL.
    ///
    /// Returns the number of entries evicted to make room.
    pub fn set(&mut self, data_type: &str, key: &str, payload: Value, synced: bool, now: u64) -> usize {
        let ttl_ms = self.types.get(data_type).ttl_ms;
        self.put(CacheEntry {
            data_type: data_type.to_string(),
            key: key.to_string(),
            payload,
            timestamp: now,
            ttl_ms,
            synced,
            version: None,
            access_count: 0,
            last_access: now,
        })
    }

    /// Inserts or replaces an entry, persisting it and enforcing capacity.
    ///
    /// Returns the number of entries evicted to make room.
    pub fn put(&mut self, mut entry: CacheEntry) -> usize {
        let id = (entry.data_type.clone(), entry.key.clone());
        if let Some(previous) = self.entries.get(&id) {
            entry.access_count = entry.access_count.max(previous.access_count);
        }
        self.persist(&entry);
        let now = entry.timestamp;
        self.entries.insert(id.clone(), entry);
        self.enforce_capacity(&id, now)
    }

    /// Marks an entry as reconciled with the remote system.
    pub fn mark_synced(&mut self, data_type: &str, key: &str) -> bool {
        let id = (data_type.to_string(), key.to_string());
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        entry.synced = true;
        let entry = entry.clone();
        self.persist(&entry);
        true
    }

    /// Removes an entry from memory and the persistent store.
    pub fn remove(&mut self, data_type: &str, key: &str) -> Option<CacheEntry> {
        let removed = self
            .entries
            .remove(&(data_type.to_string(), key.to_string()));
        if let Some(ref entry) = removed {
            self.unpersist(&entry.store_key());
        }
        removed
    }

    /// Removes every entry of a data type. Returns the number removed.
    pub fn invalidate_type(&mut self, data_type: &str) -> usize {
        let ids: Vec<EntryId> = self
            .entries
            .keys()
            .filter(|(dt, _)| dt == data_type)
            .cloned()
            .collect();
        for (dt, key) in &ids {
            self.remove(dt, key);
        }
        ids.len()
    }

    /// Removes all expired entries regardless of priority.
    pub fn sweep_expired(&mut self, now: u64) -> usize {
        let expired: Vec<EntryId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for (dt, key) in &expired {
            self.remove(dt, key);
        }
        self.stats.expired_removed += expired.len() as u64;
        if !expired.is_empty() {
            debug!("swept {} expired cache entries", expired.len());
        }
        expired.len()
    }

    /// Iterates all entries, fresh or not.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    fn enforce_capacity(&mut self, keep: &EntryId, now: u64) -> usize {
        let mut evicted = 0;

        if let Some(type_cap) = self.types.get(&keep.0).max_entries {
            let count = self.entries.keys().filter(|(dt, _)| *dt == keep.0).count();
            if count > type_cap {
                let victims = self.eviction_order(now, keep, Some(keep.0.as_str()));
                for (dt, key) in victims.into_iter().take(count - type_cap) {
                    self.remove(&dt, &key);
                    evicted += 1;
                }
            }
        }

        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            let victims = self.eviction_order(now, keep, None);
            for (dt, key) in victims.into_iter().take(excess) {
                self.remove(&dt, &key);
                evicted += 1;
            }
        }

        if evicted > 0 {
            debug!("evicted {} cache entries", evicted);
        }
        self.stats.evictions += evicted as u64;
        evicted
    }

    /// Candidates sorted most-evictable first.
    fn eviction_order(&self, now: u64, keep: &EntryId, only_type: Option<&str>) -> Vec<EntryId> {
        let mut candidates: Vec<(&EntryId, &CacheEntry)> = self
            .entries
            .iter()
            .filter(|(id, _)| *id != keep)
            .filter(|(id, _)| only_type.is_none_or(|t| id.0 == t))
            .collect();

        candidates.sort_by_key(|(_, e)| {
            (
                !e.is_expired(now),
                Reverse(self.types.get(&e.data_type).priority),
                e.access_count,
                e.timestamp,
            )
        });

        candidates.into_iter().map(|(id, _)| id.clone()).collect()
    }

    fn persist(&self, entry: &CacheEntry) {
        let key = entry.store_key();
        match serde_json::to_string(entry) {
            Ok(json) => {
                if let Err(e) = self.store.set(&key, &json) {
                    warn!("failed to persist {}: {}", key, e);
                }
            }
            Err(e) => warn!("failed to serialize {}: {}", key, e),
        }
    }

    fn unpersist(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!("failed to remove {}: {}", key, e);
        }
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
