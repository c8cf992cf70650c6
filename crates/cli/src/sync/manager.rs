// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Cached reads and eventually consistent writes.
//!
//! The manager owns the [`CacheStore`] and the [`MutationQueue`]. Mutations
//! made while offline are queued durably and applied in priority order by
//! [`SyncManager::process_queue`] once connectivity returns:
//!
//! ```text
//! set/remove ──► cache ──► (offline) queue ──► process_queue ──► remote
//!                                                    │
//!                               success: mark synced │ failure: retry, then drop
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use tether_core::{
    CacheEntry, CacheStats, CacheStore, Config, ConflictResolver, Error, FailureOutcome,
    KeyValueStore, MutationKind, MutationQueue, QueueItem, Resolution, RestoreReport,
    SyncConfig, Versioned, Winner,
};

use super::events::{DrainReport, GetOptions, MutationOutcome, SetOptions, SyncEvent};
use crate::connection::{ConnectionManager, ConnectionState, EventHandlers, Subscription};
use crate::lock;
use crate::scheduler::{every, Scheduler, TimerHandle, TokioScheduler};
use crate::transport::{Method, Request, RequestTransport, Response};

const EVENT_CAPACITY: usize = 256;

/// HTTP status the remote system uses to reject a stale write.
const STATUS_CONFLICT: u16 = 409;
const STATUS_NOT_FOUND: u16 = 404;

struct SyncState {
    cache: CacheStore,
    queue: MutationQueue,
}

/// Result of applying one mutation remotely.
enum Applied {
    Ok,
    Conflict(Versioned),
    Failed(String),
}

/// Reloaded persistent state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRestore {
    pub cache: RestoreReport,
    pub queue: RestoreReport,
}

/// Clears the in-flight flag when a drain ends, however it ends.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Cache plus durable mutation queue in front of a [`RequestTransport`].
///
/// The manager starts offline; drive connectivity with
/// [`set_online`](Self::set_online) or
/// [`link_connectivity`](Self::link_connectivity).
pub struct SyncManager<R: RequestTransport> {
    transport: R,
    scheduler: Arc<dyn Scheduler>,
    config: SyncConfig,
    /// Replaces the per data type conflict policy when set.
    resolver: Option<Arc<dyn ConflictResolver>>,
    state: Mutex<SyncState>,
    online: AtomicBool,
    draining: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

impl<R: RequestTransport> SyncManager<R> {
    /// Creates a manager over `store`, configured from `config`.
    ///
    /// Nothing is loaded from the store until [`restore`](Self::restore).
    pub fn new(transport: R, store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        let cache = CacheStore::new(Arc::clone(&store), config.data_type_table(), &config.cache);
        let queue = MutationQueue::new(store);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        SyncManager {
            transport,
            scheduler: Arc::new(TokioScheduler::new()),
            config: config.sync.clone(),
            resolver: None,
            state: Mutex::new(SyncState { cache, queue }),
            online: AtomicBool::new(false),
            draining: AtomicBool::new(false),
            events,
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Uses `resolver` for every data type instead of its configured policy.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Reloads cache entries and queued mutations persisted by an earlier run.
    pub fn restore(&self) -> SyncRestore {
        let mut state = lock(&self.state);
        let report = SyncRestore {
            cache: state.cache.restore(),
            queue: state.queue.restore(),
        };
        info!(
            "restored {} cache entries and {} queued mutations",
            report.cache.loaded, report.queue.loaded
        );
        report
    }

    /// Receives [`SyncEvent`]s emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Returns the cached payload, or `None` on a miss.
    ///
    /// Expired entries are a miss unless `allow_stale` is set. Fetching on a
    /// miss is up to the caller.
    pub fn get(&self, data_type: &str, key: &str, options: GetOptions) -> Option<Value> {
        self.entry(data_type, key, options).map(|e| e.payload)
    }

    /// Like [`get`](Self::get), returning the whole entry.
    pub fn entry(&self, data_type: &str, key: &str, options: GetOptions) -> Option<CacheEntry> {
        let now = self.scheduler.now_ms();
        lock(&self.state)
            .cache
            .get(data_type, key, now, options.allow_stale)
    }

    /// Caches a payload with its data type's TTL.
    ///
    /// An unsynced write made while offline is queued for the next drain.
    /// Returns the queue item ID when one was created or updated.
    pub fn set(
        &self,
        data_type: &str,
        key: &str,
        payload: Value,
        options: SetOptions,
    ) -> Option<String> {
        let now = self.scheduler.now_ms();
        let mut state = lock(&self.state);
        state
            .cache
            .set(data_type, key, payload.clone(), options.synced, now);
        if options.synced || self.is_online() {
            return None;
        }
        Some(self.queue_write(&mut state, data_type, key, payload, now))
    }

    /// Removes a cached entry. While offline the delete is queued.
    pub fn remove(&self, data_type: &str, key: &str) -> Option<String> {
        let now = self.scheduler.now_ms();
        let mut state = lock(&self.state);
        state.cache.remove(data_type, key);
        if self.is_online() {
            return None;
        }
        Some(self.queue_delete(&mut state, data_type, key, now))
    }

    /// Writes through to the remote system, queueing on failure.
    ///
    /// The cache is updated first, so reads see the new payload immediately.
    pub async fn mutate(&self, data_type: &str, key: &str, payload: Value) -> MutationOutcome {
        let now = self.scheduler.now_ms();
        lock(&self.state)
            .cache
            .set(data_type, key, payload.clone(), false, now);

        if !self.is_online() {
            let mut state = lock(&self.state);
            let id = self.queue_write(&mut state, data_type, key, payload, now);
            return MutationOutcome::Queued(id);
        }

        match self
            .apply(data_type, key, MutationKind::Write, Some(payload.clone()), now)
            .await
        {
            Applied::Ok => {
                lock(&self.state).cache.mark_synced(data_type, key);
                MutationOutcome::Applied
            }
            Applied::Conflict(remote) => {
                let local = Versioned::new(payload, now);
                let resolution = self.settle_conflict(data_type, key, &local, remote);
                MutationOutcome::Resolved(resolution.winner)
            }
            Applied::Failed(reason) => {
                warn!("write {}/{} failed, queueing: {}", data_type, key, reason);
                let now = self.scheduler.now_ms();
                let mut state = lock(&self.state);
                let id = self.queue_write(&mut state, data_type, key, payload, now);
                MutationOutcome::Queued(id)
            }
        }
    }

    /// Deletes remotely, queueing on failure. The cache entry is removed first.
    pub async fn delete(&self, data_type: &str, key: &str) -> MutationOutcome {
        let now = self.scheduler.now_ms();
        lock(&self.state).cache.remove(data_type, key);

        if self.is_online() {
            match self.apply(data_type, key, MutationKind::Delete, None, now).await {
                Applied::Ok => return MutationOutcome::Applied,
                Applied::Conflict(_) => {
                    warn!("delete {}/{} rejected as conflicting, queueing", data_type, key)
                }
                Applied::Failed(reason) => {
                    warn!("delete {}/{} failed, queueing: {}", data_type, key, reason)
                }
            }
        }

        let now = self.scheduler.now_ms();
        let mut state = lock(&self.state);
        let id = self.queue_delete(&mut state, data_type, key, now);
        MutationOutcome::Queued(id)
    }

    /// Drops every cached entry of a data type. Queued mutations are kept.
    pub fn invalidate(&self, data_type: &str) -> usize {
        let removed = lock(&self.state).cache.invalidate_type(data_type);
        debug!("invalidated {} {} entries", removed, data_type);
        removed
    }

    /// Queued mutations in drain order.
    pub fn pending(&self) -> Vec<QueueItem> {
        lock(&self.state).queue.pending()
    }

    pub fn cache_stats(&self) -> CacheStats {
        lock(&self.state).cache.stats()
    }

    /// Removes expired cache entries. Returns the number removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.scheduler.now_ms();
        lock(&self.state).cache.sweep_expired(now)
    }

    /// Resolves a local edit against a remote value with the data type's
    /// policy. Does not touch the cache.
    pub fn resolve_conflict(
        &self,
        data_type: &str,
        local: &Versioned,
        remote: &Versioned,
    ) -> Resolution {
        match &self.resolver {
            Some(resolver) => resolver.resolve(local, remote),
            None => {
                let policy = lock(&self.state).cache.types().get(data_type).conflict_policy;
                policy.resolve(local, remote)
            }
        }
    }

    /// Reconciles the cached entry for a key with a remote value.
    ///
    /// Without a cached entry the remote value is cached as synced. Otherwise
    /// the resolution is cached; a local or merged winner is queued for the
    /// next drain and a remote winner discards queued mutations of the key.
    pub fn reconcile(&self, data_type: &str, key: &str, remote: Versioned) -> Resolution {
        let local = lock(&self.state)
            .cache
            .peek(data_type, key)
            .map(|e| Versioned::new(e.payload.clone(), e.timestamp));
        match local {
            Some(local) => self.settle_conflict(data_type, key, &local, remote),
            None => {
                let now = self.scheduler.now_ms();
                let resolution = Resolution {
                    value: remote.payload,
                    winner: Winner::Remote,
                };
                lock(&self.state)
                    .cache
                    .set(data_type, key, resolution.value.clone(), true, now);
                resolution
            }
        }
    }

    /// Records connectivity without draining. Returns true if it changed.
    pub fn update_connectivity(&self, online: bool) -> bool {
        let changed = self.online.swap(online, Ordering::SeqCst) != online;
        if changed {
            info!("sync {}", if online { "online" } else { "offline" });
            self.emit(SyncEvent::ConnectivityChanged { online });
        }
        changed
    }

    /// Records connectivity. Going online drains the queue and returns the
    /// drain report.
    pub async fn set_online(&self, online: bool) -> Option<DrainReport> {
        if self.update_connectivity(online) && online {
            self.process_queue().await
        } else {
            None
        }
    }

    /// Applies queued mutations in priority order.
    ///
    /// Returns `None` without doing anything when offline or when another
    /// drain is in flight. Stops early if connectivity is lost mid-drain.
    pub async fn process_queue(&self) -> Option<DrainReport> {
        if !self.is_online() {
            debug!("drain skipped: offline");
            return None;
        }
        if self.draining.swap(true, Ordering::SeqCst) {
            debug!("drain skipped: already in flight");
            return None;
        }
        let _guard = DrainGuard(&self.draining);

        let pending = lock(&self.state).queue.pending();
        let mut report = DrainReport::default();

        for queued in pending {
            if !self.is_online() {
                report.halted = true;
                break;
            }
            // Items can be replaced or removed while a request is in flight
            let current = lock(&self.state).queue.get(&queued.id).cloned();
            let Some(item) = current else {
                continue;
            };

            report.attempted += 1;
            let body = match item.kind {
                MutationKind::Write => Some(item.payload.clone()),
                MutationKind::Delete => None,
            };
            let now = self.scheduler.now_ms();
            match self.apply(&item.data_type, &item.key, item.kind, body, now).await {
                Applied::Ok => {
                    let mut state = lock(&self.state);
                    state.queue.remove(&item.id);
                    if item.kind == MutationKind::Write {
                        state.cache.mark_synced(&item.data_type, &item.key);
                    }
                    report.succeeded += 1;
                }
                Applied::Conflict(remote) => {
                    report.conflicts += 1;
                    let local = Versioned::new(item.payload.clone(), item.created_at);
                    let resolution =
                        self.settle_conflict(&item.data_type, &item.key, &local, remote);
                    if resolution.winner != Winner::Remote {
                        // The resolved payload is retried on the next drain
                        self.record_failure(&item, "conflict resolved locally", &mut report);
                    }
                }
                Applied::Failed(reason) => self.record_failure(&item, &reason, &mut report),
            }
        }

        report.remaining = lock(&self.state).queue.len();
        info!(
            "drain: {} succeeded, {} failed, {} dropped, {} remaining{}",
            report.succeeded,
            report.failed,
            report.dropped,
            report.remaining,
            if report.halted { " (halted offline)" } else { "" }
        );
        self.emit(SyncEvent::DrainCompleted(report.clone()));
        Some(report)
    }

    fn emit(&self, event: SyncEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }

    /// Queues a write, folding it into an already queued write of the key.
    fn queue_write(
        &self,
        state: &mut SyncState,
        data_type: &str,
        key: &str,
        payload: Value,
        now: u64,
    ) -> String {
        let queued = state
            .queue
            .pending()
            .into_iter()
            .rev()
            .find(|i| i.data_type == data_type && i.key == key);
        if let Some(existing) = queued.filter(|i| i.kind == MutationKind::Write) {
            state.queue.update_payload(&existing.id, payload);
            return existing.id;
        }
        let priority = state.cache.types().get(data_type).priority;
        state
            .queue
            .enqueue(data_type, key, MutationKind::Write, payload, priority, now)
            .id
    }

    fn queue_delete(&self, state: &mut SyncState, data_type: &str, key: &str, now: u64) -> String {
        let priority = state.cache.types().get(data_type).priority;
        state
            .queue
            .enqueue(data_type, key, MutationKind::Delete, Value::Null, priority, now)
            .id
    }

    fn record_failure(&self, item: &QueueItem, reason: &str, report: &mut DrainReport) {
        let outcome = lock(&self.state)
            .queue
            .record_failure(&item.id, reason, self.config.max_retries);
        match outcome {
            Some(FailureOutcome::Retry(item)) => {
                warn!(
                    "mutation {} failed (attempt {}/{}): {}",
                    item.id, item.retry_count, self.config.max_retries, reason
                );
                report.failed += 1;
            }
            Some(FailureOutcome::Dropped(item)) => {
                let err = Error::SyncPermanentFailure {
                    id: item.id.clone(),
                    data_type: item.data_type.clone(),
                    key: item.key.clone(),
                    retries: item.retry_count,
                    reason: reason.to_string(),
                };
                error!("{}", err);
                report.dropped += 1;
                self.emit(SyncEvent::PermanentFailure {
                    item,
                    reason: reason.to_string(),
                });
            }
            None => {}
        }
    }

    /// Resolves a conflict and caches the outcome.
    fn settle_conflict(
        &self,
        data_type: &str,
        key: &str,
        local: &Versioned,
        remote: Versioned,
    ) -> Resolution {
        let resolution = self.resolve_conflict(data_type, local, &remote);
        let now = self.scheduler.now_ms();
        {
            let mut state = lock(&self.state);
            match resolution.winner {
                Winner::Remote => {
                    state
                        .cache
                        .set(data_type, key, resolution.value.clone(), true, now);
                    let discarded: Vec<String> = state
                        .queue
                        .pending()
                        .into_iter()
                        .filter(|i| i.data_type == data_type && i.key == key)
                        .map(|i| i.id)
                        .collect();
                    for id in &discarded {
                        state.queue.remove(id);
                    }
                }
                Winner::Local | Winner::Merged => {
                    state
                        .cache
                        .set(data_type, key, resolution.value.clone(), false, now);
                    self.queue_write(&mut state, data_type, key, resolution.value.clone(), now);
                }
            }
        }
        debug!("conflict on {}/{} resolved: {:?}", data_type, key, resolution.winner);
        self.emit(SyncEvent::ConflictResolved {
            data_type: data_type.to_string(),
            key: key.to_string(),
            winner: resolution.winner,
        });
        resolution
    }

    async fn apply(
        &self,
        data_type: &str,
        key: &str,
        kind: MutationKind,
        body: Option<Value>,
        now: u64,
    ) -> Applied {
        let method = match kind {
            MutationKind::Write => Method::Put,
            MutationKind::Delete => Method::Delete,
        };
        let request = Request {
            url: format!("{}/{}/{}", self.config.base_url.trim_end_matches('/'), data_type, key),
            method,
            body,
            timeout: self.config.request_timeout(),
        };
        debug!("{} {}", request.method, request.url);

        match self.transport.request(request).await {
            Ok(response) => classify(kind, response, now),
            Err(e) => Applied::Failed(e.to_string()),
        }
    }
}

fn classify(kind: MutationKind, response: Response, now: u64) -> Applied {
    if response.is_success() {
        return Applied::Ok;
    }
    match (response.status, kind) {
        // Already gone remotely
        (STATUS_NOT_FOUND, MutationKind::Delete) => Applied::Ok,
        (STATUS_CONFLICT, _) => Applied::Conflict(Versioned::new(
            response.data.unwrap_or(Value::Null),
            response.timestamp.unwrap_or(now),
        )),
        (status, _) => Applied::Failed(format!("remote returned status {status}")),
    }
}

impl<R: RequestTransport + 'static> SyncManager<R> {
    /// Sweeps expired cache entries every `interval` until the handle is
    /// dropped or cancelled.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> TimerHandle {
        let manager = Arc::downgrade(self);
        every(
            Arc::clone(&self.scheduler),
            interval,
            Box::new(move || {
                if let Some(manager) = manager.upgrade() {
                    manager.sweep_expired();
                }
            }),
        )
    }

    /// Follows the state of a managed connection: `Open` means online and
    /// triggers a drain, any other state means offline.
    pub fn link_connectivity(
        self: &Arc<Self>,
        connections: &ConnectionManager,
        name: &str,
    ) -> tether_core::Result<Subscription> {
        let manager: Weak<Self> = Arc::downgrade(self);
        let handlers = EventHandlers::new().on_state_change(move |_, to| {
            let Some(manager) = manager.upgrade() else {
                return;
            };
            let online = to == ConnectionState::Open;
            if manager.update_connectivity(online) && online {
                tokio::spawn(async move {
                    manager.process_queue().await;
                });
            }
        });
        let subscription = connections.on_message(name, handlers)?;
        if connections.state(name)? == ConnectionState::Open && self.update_connectivity(true) {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                manager.process_queue().await;
            });
        }
        Ok(subscription)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
