// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use std::sync::Mutex;

use futures_util::FutureExt;
use serde_json::json;
use tether_core::{ConflictPolicy, ConnectionConfig, ManagerConfig, MemoryStore};
use tokio::sync::broadcast::error::TryRecvError;

use super::*;
use crate::test_helpers::settle;
use crate::transport::testing::{MockConnector, MockRequests};
use crate::transport::TransportError;

fn config() -> Config {
    let mut config = Config::default();
    config.sync.base_url = "http://pos.test/api/".to_string();
    config
}

fn manager(requests: &MockRequests) -> SyncManager<MockRequests> {
    SyncManager::new(requests.clone(), Arc::new(MemoryStore::new()), &config())
}

fn conflict(remote: serde_json::Value, timestamp: u64) -> Response {
    Response {
        status: STATUS_CONFLICT,
        data: Some(remote),
        timestamp: Some(timestamp),
    }
}

fn status(code: u16) -> Response {
    Response {
        status: code,
        data: None,
        timestamp: None,
    }
}

fn drain_events(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
            Err(TryRecvError::Lagged(_)) => continue,
        }
    }
}

#[tokio::test]
async fn offline_write_applies_once_when_online() {
    let requests = MockRequests::new();
    let sync = manager(&requests);

    let id = sync.set("order", "k1", json!({"total": 12}), SetOptions::default());
    assert!(id.is_some());
    assert_eq!(sync.pending().len(), 1);
    assert!(requests.requests().is_empty());

    let report = sync.set_online(true).await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.remaining, 0);

    let sent = requests.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, Method::Put);
    assert_eq!(sent[0].url, "http://pos.test/api/order/k1");
    assert_eq!(sent[0].body, Some(json!({"total": 12})));
    assert!(sync.entry("order", "k1", GetOptions::default()).unwrap().synced);
    assert!(sync.pending().is_empty());
}

#[tokio::test]
async fn online_and_synced_writes_are_not_queued() {
    let requests = MockRequests::new();
    let sync = manager(&requests);

    assert_eq!(
        sync.set("menu", "burger", json!({"price": 9}), SetOptions::synced()),
        None
    );
    sync.set_online(true).await;
    assert_eq!(
        sync.set("order", "k1", json!({"total": 1}), SetOptions::default()),
        None
    );

    assert!(sync.pending().is_empty());
    assert_eq!(sync.get("menu", "burger", GetOptions::default()), Some(json!({"price": 9})));
}

#[tokio::test]
async fn repeated_offline_writes_fold_into_one_item() {
    let sync = manager(&MockRequests::new());

    let first = sync.set("order", "k1", json!({"total": 1}), SetOptions::default());
    let second = sync.set("order", "k1", json!({"total": 2}), SetOptions::default());

    assert_eq!(first, second);
    let pending = sync.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, json!({"total": 2}));
}

#[tokio::test]
async fn offline_remove_queues_delete() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    sync.set("order", "k1", json!({"total": 1}), SetOptions::synced());

    assert!(sync.remove("order", "k1").is_some());
    assert_eq!(sync.get("order", "k1", GetOptions::stale()), None);
    assert_eq!(sync.pending()[0].kind, MutationKind::Delete);

    sync.set_online(true).await.unwrap();
    let sent = requests.requests();
    assert_eq!(sent[0].method, Method::Delete);
    assert_eq!(sent[0].body, None);
}

#[tokio::test]
async fn drain_follows_data_type_priority() {
    let requests = MockRequests::new();
    let sync = manager(&requests);

    sync.set("menu", "burger", json!({}), SetOptions::default());
    sync.set("payment", "p1", json!({}), SetOptions::default());
    sync.set("order", "k1", json!({}), SetOptions::default());

    sync.set_online(true).await.unwrap();

    let urls: Vec<String> = requests.requests().into_iter().map(|r| r.url).collect();
    assert_eq!(
        urls,
        vec![
            "http://pos.test/api/payment/p1",
            "http://pos.test/api/order/k1",
            "http://pos.test/api/menu/burger",
        ]
    );
}

#[tokio::test]
async fn failures_retry_then_drop_with_event() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    let mut rx = sync.subscribe();
    for _ in 0..3 {
        requests.reply(Err(TransportError::RequestFailed("gateway down".into())));
    }
    sync.set("order", "k1", json!({"total": 5}), SetOptions::default());

    let first = sync.set_online(true).await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(first.remaining, 1);
    assert_eq!(sync.pending()[0].retry_count, 1);

    let second = sync.process_queue().await.unwrap();
    assert_eq!(second.failed, 1);
    assert_eq!(sync.pending()[0].retry_count, 2);

    let third = sync.process_queue().await.unwrap();
    assert_eq!(third.dropped, 1);
    assert_eq!(third.remaining, 0);
    assert!(sync.pending().is_empty());

    let dropped: Vec<(QueueItem, String)> = drain_events(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::PermanentFailure { item, reason } => Some((item, reason)),
            _ => None,
        })
        .collect();
    assert_eq!(dropped.len(), 1);
    assert_eq!(dropped[0].0.key, "k1");
    assert_eq!(dropped[0].0.retry_count, 3);
    assert!(dropped[0].1.contains("gateway down"));

    // The local copy stays, still unsynced
    assert!(!sync.entry("order", "k1", GetOptions::default()).unwrap().synced);
}

#[tokio::test]
async fn error_status_counts_as_failure() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    requests.reply(Ok(status(500)));
    sync.set("order", "k1", json!({}), SetOptions::default());

    let report = sync.set_online(true).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(
        sync.pending()[0].last_error.as_deref(),
        Some("remote returned status 500")
    );
}

#[tokio::test]
async fn missing_remote_record_completes_delete() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    sync.set_online(true).await;
    requests.reply(Ok(status(404)));

    assert_eq!(sync.delete("order", "gone").await, MutationOutcome::Applied);
    assert!(sync.pending().is_empty());
}

#[tokio::test]
async fn drain_is_noop_while_offline() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    sync.set("order", "k1", json!({}), SetOptions::default());

    assert_eq!(sync.process_queue().await, None);
    assert!(requests.requests().is_empty());
    assert_eq!(sync.pending().len(), 1);
}

#[tokio::test]
async fn losing_connectivity_halts_drain() {
    let requests = MockRequests::new();
    let sync = Arc::new(manager(&requests));
    for key in ["a", "b", "c"] {
        sync.set("order", key, json!({}), SetOptions::default());
    }

    let weak = Arc::downgrade(&sync);
    requests.on_request(move |_| {
        if let Some(sync) = weak.upgrade() {
            sync.update_connectivity(false);
        }
    });

    let report = sync.set_online(true).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(report.halted);
    assert_eq!(report.remaining, 2);
    assert_eq!(requests.requests().len(), 1);
    assert!(!sync.is_online());
}

#[tokio::test]
async fn overlapping_drain_is_skipped() {
    let requests = MockRequests::new();
    let sync = Arc::new(manager(&requests));
    sync.set("order", "k1", json!({}), SetOptions::default());

    let nested = Arc::new(Mutex::new(Vec::new()));
    let (weak, log) = (Arc::downgrade(&sync), Arc::clone(&nested));
    requests.on_request(move |_| {
        if let Some(sync) = weak.upgrade() {
            let outcome = sync.process_queue().now_or_never();
            log.lock().unwrap().push(outcome);
        }
    });

    let report = sync.set_online(true).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(*nested.lock().unwrap(), vec![Some(None)]);

    // The flag is cleared once the drain ends
    assert!(sync.process_queue().await.is_some());
}

#[tokio::test]
async fn remote_winning_conflict_discards_local_edit() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    let mut rx = sync.subscribe();
    sync.set("table_status", "t4", json!({"status": "dirty"}), SetOptions::default());
    requests.reply(Ok(conflict(json!({"status": "seated"}), 1)));

    let report = sync.set_online(true).await.unwrap();

    assert_eq!(report.conflicts, 1);
    assert_eq!(report.remaining, 0);
    let entry = sync.entry("table_status", "t4", GetOptions::default()).unwrap();
    assert_eq!(entry.payload, json!({"status": "seated"}));
    assert!(entry.synced);
    assert!(drain_events(&mut rx).contains(&SyncEvent::ConflictResolved {
        data_type: "table_status".into(),
        key: "t4".into(),
        winner: Winner::Remote,
    }));
}

#[tokio::test]
async fn local_winning_conflict_is_retried() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    sync.set("settings", "tax", json!({"rate": 8}), SetOptions::default());
    requests.reply(Ok(conflict(json!({"rate": 7}), 1)));

    let first = sync.set_online(true).await.unwrap();
    assert_eq!(first.conflicts, 1);
    assert_eq!(first.failed, 1);
    assert_eq!(sync.pending()[0].payload, json!({"rate": 8}));
    assert!(!sync.entry("settings", "tax", GetOptions::default()).unwrap().synced);

    let second = sync.process_queue().await.unwrap();
    assert_eq!(second.succeeded, 1);
    assert!(sync.entry("settings", "tax", GetOptions::default()).unwrap().synced);
    assert_eq!(requests.requests()[1].body, Some(json!({"rate": 8})));
}

#[tokio::test]
async fn merge_policy_overlays_local_keys() {
    let sync = manager(&MockRequests::new());
    let local = Versioned::new(json!({"name": "Ana", "phone": "1"}), 10);
    let remote = Versioned::new(json!({"name": "Ana B", "email": "a@b.c"}), 20);

    let once = sync.resolve_conflict("customer", &local, &remote);
    let twice = sync.resolve_conflict("customer", &local, &remote);

    assert_eq!(once, twice);
    assert_eq!(once.winner, Winner::Merged);
    assert_eq!(
        once.value,
        json!({"name": "Ana", "phone": "1", "email": "a@b.c"})
    );
    // Pure: nothing cached
    assert_eq!(sync.get("customer", "c1", GetOptions::stale()), None);
}

#[tokio::test]
async fn timestamp_policy_ties_go_to_remote() {
    let sync = manager(&MockRequests::new());
    let remote = Versioned::new(json!("remote"), 5);

    let tie = sync.resolve_conflict("order", &Versioned::new(json!("local"), 5), &remote);
    let newer = sync.resolve_conflict("order", &Versioned::new(json!("local"), 6), &remote);

    assert_eq!(tie.winner, Winner::Remote);
    assert_eq!(newer.winner, Winner::Local);
}

#[tokio::test]
async fn resolver_override_applies_to_every_type() {
    let sync = manager(&MockRequests::new()).with_resolver(Arc::new(ConflictPolicy::ClientWins));
    let resolution = sync.resolve_conflict(
        "table_status",
        &Versioned::new(json!(1), 0),
        &Versioned::new(json!(2), 0),
    );
    assert_eq!(resolution.winner, Winner::Local);
}

#[tokio::test]
async fn reconcile_without_local_copy_caches_remote() {
    let sync = manager(&MockRequests::new());

    let resolution = sync.reconcile("menu", "burger", Versioned::new(json!({"price": 9}), 1));

    assert_eq!(resolution.winner, Winner::Remote);
    let entry = sync.entry("menu", "burger", GetOptions::default()).unwrap();
    assert!(entry.synced);
    assert_eq!(entry.payload, json!({"price": 9}));
}

#[tokio::test]
async fn reconcile_merge_queues_result() {
    let sync = manager(&MockRequests::new());
    sync.set("customer", "c1", json!({"phone": "1"}), SetOptions::synced());

    let resolution = sync.reconcile("customer", "c1", Versioned::new(json!({"email": "e"}), 1));

    assert_eq!(resolution.winner, Winner::Merged);
    let pending = sync.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload, json!({"phone": "1", "email": "e"}));
}

#[tokio::test]
async fn mutate_online_applies_directly() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    sync.set_online(true).await;

    let outcome = sync.mutate("order", "k1", json!({"total": 3})).await;

    assert_eq!(outcome, MutationOutcome::Applied);
    assert!(sync.entry("order", "k1", GetOptions::default()).unwrap().synced);
    assert!(sync.pending().is_empty());
}

#[tokio::test]
async fn mutate_falls_back_to_queue() {
    let requests = MockRequests::new();
    let sync = manager(&requests);
    sync.set_online(true).await;
    requests.reply(Err(TransportError::Timeout(Duration::from_secs(10))));

    let outcome = sync.mutate("order", "k1", json!({"total": 3})).await;

    let queued_id = sync.pending()[0].id.clone();
    assert_eq!(outcome, MutationOutcome::Queued(queued_id));
    assert_eq!(sync.get("order", "k1", GetOptions::default()), Some(json!({"total": 3})));
}

#[tokio::test]
async fn mutate_offline_queues_without_request() {
    let requests = MockRequests::new();
    let sync = manager(&requests);

    let outcome = sync.mutate("order", "k1", json!({})).await;

    assert!(matches!(outcome, MutationOutcome::Queued(_)));
    assert!(requests.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_ttl() {
    let sync = manager(&MockRequests::new());
    // table_status keeps entries for 30s
    sync.set("table_status", "t1", json!("free"), SetOptions::synced());

    tokio::time::advance(Duration::from_millis(29_999)).await;
    assert_eq!(sync.get("table_status", "t1", GetOptions::default()), Some(json!("free")));

    tokio::time::advance(Duration::from_millis(2)).await;
    assert_eq!(sync.get("table_status", "t1", GetOptions::default()), None);
    assert_eq!(sync.get("table_status", "t1", GetOptions::stale()), Some(json!("free")));
}

#[tokio::test(start_paused = true)]
async fn sweeper_removes_expired_entries() {
    let sync = Arc::new(manager(&MockRequests::new()));
    sync.set("table_status", "t1", json!("free"), SetOptions::synced());
    sync.set("menu", "burger", json!({}), SetOptions::synced());

    let sweeper = sync.start_sweeper(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(sync.get("table_status", "t1", GetOptions::stale()), None);
    assert!(sync.get("menu", "burger", GetOptions::default()).is_some());
    assert_eq!(sync.cache_stats().expired_removed, 1);
    drop(sweeper);
}

#[tokio::test]
async fn restore_reloads_queue_and_cache() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    {
        let sync = SyncManager::new(MockRequests::new(), Arc::clone(&store), &config());
        sync.set("order", "k1", json!({"total": 4}), SetOptions::default());
    }
    store.set("cache:order:broken", "{not json").unwrap();

    let requests = MockRequests::new();
    let sync = SyncManager::new(requests.clone(), Arc::clone(&store), &config());
    let report = sync.restore();

    assert_eq!(report.cache.loaded, 1);
    assert_eq!(report.cache.purged, 1);
    assert_eq!(report.queue.loaded, 1);
    assert_eq!(store.get("cache:order:broken").unwrap(), None);

    sync.set_online(true).await.unwrap();
    assert_eq!(requests.requests().len(), 1);
}

#[tokio::test]
async fn connectivity_changes_are_broadcast_once() {
    let sync = manager(&MockRequests::new());
    let mut rx = sync.subscribe();

    assert!(sync.set_online(true).await.is_some());
    assert!(sync.set_online(true).await.is_none());
    sync.set_online(false).await;

    let events = drain_events(&mut rx);
    assert_eq!(
        events,
        vec![
            SyncEvent::ConnectivityChanged { online: true },
            SyncEvent::DrainCompleted(DrainReport::default()),
            SyncEvent::ConnectivityChanged { online: false },
        ]
    );
}

#[tokio::test]
async fn invalidate_drops_type_but_keeps_queue() {
    let sync = manager(&MockRequests::new());
    sync.set("menu", "a", json!(1), SetOptions::default());
    sync.set("menu", "b", json!(2), SetOptions::synced());
    sync.set("order", "k1", json!(3), SetOptions::synced());

    assert_eq!(sync.invalidate("menu"), 2);
    assert_eq!(sync.get("menu", "a", GetOptions::stale()), None);
    assert!(sync.get("order", "k1", GetOptions::default()).is_some());
    assert_eq!(sync.pending().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn linked_connection_drives_connectivity() {
    let requests = MockRequests::new();
    let sync = Arc::new(manager(&requests));
    let connector = MockConnector::new();
    let connections =
        ConnectionManager::new(Arc::new(connector.clone()), &ManagerConfig::default());
    connections
        .create_connection(
            "push",
            ConnectionConfig::new("ws://pos.test/live")
                .with_heartbeat_interval_ms(0)
                .with_reconnect_delays_ms(100, 1_000),
        )
        .await
        .unwrap();

    sync.set("order", "k1", json!({}), SetOptions::default());
    let _link = sync.link_connectivity(&connections, "push").unwrap();
    settle().await;
    assert!(sync.is_online());
    assert_eq!(requests.requests().len(), 1);

    connector.latest().close(1006).await;
    settle().await;
    assert!(!sync.is_online());
    sync.set("order", "k2", json!({}), SetOptions::default());

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(sync.is_online());
    assert_eq!(requests.requests().len(), 2);
    assert!(sync.pending().is_empty());
}
