// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Durable queue of pending mutations.
//!
//! Each item is written to the [`KeyValueStore`] under `queue:<id>` before it
//! is added to the in-memory queue, so a restart does not lose offline edits.
//! Items drain in ascending priority order; within a priority, in creation
//! order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::cache::RestoreReport;
use crate::store::KeyValueStore;

/// Store key prefix for persisted queue items.
pub const QUEUE_PREFIX: &str = "queue:";

/// Kind of remote change a queue item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Write,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Write => write!(f, "write"),
            MutationKind::Delete => write!(f, "delete"),
        }
    }
}

/// A mutation waiting to be applied to the remote system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub data_type: String,
    pub key: String,
    /// Payload to write; `Null` for deletes.
    pub payload: Value,
    pub kind: MutationKind,
    /// Milliseconds since Unix epoch.
    pub created_at: u64,
    pub retry_count: u32,
    /// Lower numbers drain first.
    pub priority: u8,
    /// Tie-breaker preserving enqueue order within one millisecond.
    #[serde(default)]
    pub seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueItem {
    fn store_key(&self) -> String {
        format!("{QUEUE_PREFIX}{}", self.id)
    }

    fn drain_order(&self) -> (u8, u64, u64) {
        (self.priority, self.created_at, self.seq)
    }
}

/// What happened to an item after a failed remote attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureOutcome {
    /// The item stays queued for the next drain.
    Retry(QueueItem),
    /// The item reached the retry limit and was removed.
    Dropped(QueueItem),
}

/// Generates a short mutation ID from its identity and enqueue position.
///
/// Format: `mut-{hash}` where hash is the first 12 hex chars of
/// SHA256(data_type, key, created_at, seq).
pub fn generate_id(data_type: &str, key: &str, created_at: u64, seq: u64) -> String {
    let input = format!("{data_type}\0{key}\0{created_at}\0{seq}");
    let hash = Sha256::digest(input.as_bytes());
    format!("mut-{}", hex::encode(&hash[..6]))
}

/// Durable, priority-ordered mutation queue.
pub struct MutationQueue {
    items: BTreeMap<String, QueueItem>,
    store: Arc<dyn KeyValueStore>,
    next_seq: u64,
}

impl MutationQueue {
    /// Creates an empty queue. Call [`MutationQueue::restore`] to reload
    /// persisted items.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        MutationQueue {
            items: BTreeMap::new(),
            store,
            next_seq: 0,
        }
    }

    /// Reloads persisted items, purging records that fail to parse.
    pub fn restore(&mut self) -> RestoreReport {
        let mut report = RestoreReport::default();
        let keys = match self.store.keys_with_prefix(QUEUE_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                warn!("queue restore skipped, store unavailable: {}", e);
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
            match serde_json::from_str::<QueueItem>(&raw) {
                Ok(item) => {
                    self.next_seq = self.next_seq.max(item.seq + 1);
                    self.items.insert(item.id.clone(), item);
                    report.loaded += 1;
                }
                Err(e) => {
                    warn!("unreadable queue item {}: {}; purging", store_key, e);
                    if let Err(e) = self.store.remove(&store_key) {
                        warn!("failed to purge {}: {}", store_key, e);
                    }
                    report.purged += 1;
                }
            }
        }

        debug!("queue restored: {} loaded, {} purged", report.loaded, report.purged);
        report
    }

    /// Persists and enqueues a new mutation.
    pub fn enqueue(
        &mut self,
        data_type: &str,
        key: &str,
        kind: MutationKind,
        payload: Value,
        priority: u8,
        now: u64,
    ) -> QueueItem {
        let seq = self.next_seq;
        self.next_seq += 1;

        let item = QueueItem {
            id: generate_id(data_type, key, now, seq),
            data_type: data_type.to_string(),
            key: key.to_string(),
            payload,
            kind,
            created_at: now,
            retry_count: 0,
            priority,
            seq,
            last_error: None,
        };

        self.persist(&item);
        self.items.insert(item.id.clone(), item.clone());
        debug!(
            "queued {} {} for {}/{} (priority {})",
            item.id, kind, data_type, key, priority
        );
        item
    }

    /// Pending items in drain order.
    pub fn pending(&self) -> Vec<QueueItem> {
        let mut items: Vec<QueueItem> = self.items.values().cloned().collect();
        items.sort_by_key(QueueItem::drain_order);
        items
    }

    /// Looks up an item by ID.
    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.get(id)
    }

    /// Removes an item after successful remote application.
    pub fn remove(&mut self, id: &str) -> Option<QueueItem> {
        let removed = self.items.remove(id);
        if let Some(ref item) = removed {
            if let Err(e) = self.store.remove(&item.store_key()) {
                warn!("failed to remove {}: {}", item.store_key(), e);
            }
        }
        removed
    }

    /// Replaces the payload of a queued item, keeping its position.
    pub fn update_payload(&mut self, id: &str, payload: Value) -> bool {
        let Some(item) = self.items.get_mut(id) else {
            return false;
        };
        item.payload = payload;
        let item = item.clone();
        self.persist(&item);
        true
    }

    /// Records a failed remote attempt.
    ///
    /// The retry count is incremented; once it reaches `max_retries` the item
    /// is removed and returned as [`FailureOutcome::Dropped`].
    pub fn record_failure(&mut self, id: &str, reason: &str, max_retries: u32) -> Option<FailureOutcome> {
        let item = self.items.get_mut(id)?;
        item.retry_count += 1;
        item.last_error = Some(reason.to_string());
        let item = item.clone();

        if item.retry_count >= max_retries {
            self.remove(id);
            return Some(FailureOutcome::Dropped(item));
        }

        self.persist(&item);
        Some(FailureOutcome::Retry(item))
    }

    /// Removes every item. Returns the number removed.
    pub fn clear(&mut self) -> usize {
        let ids: Vec<String> = self.items.keys().cloned().collect();
        for id in &ids {
            self.remove(id);
        }
        ids.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn persist(&self, item: &QueueItem) {
        let key = item.store_key();
        match serde_json::to_string(item) {
            Ok(json) => {
                if let Err(e) = self.store.set(&key, &json) {
                    warn!("failed to persist {}: {}", key, e);
                }
            }
            Err(e) => warn!("failed to serialize {}: {}", key, e),
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
