// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Pool of named duplex connections.
//!
//! Each connection is driven by one background task that opens the channel,
//! replays queued messages, pumps inbound frames, sends heartbeats, and
//! reconnects with backoff when the channel drops:
//!
//! ```text
//! Connecting ──► Open ──► Closed | Error ──► Reconnecting ──► Open
//!                                     │
//!                                     └──► Failed (terminal)
//! ```
//!
//! Every channel a task opens gets a new epoch. State changes and writes are
//! tagged with the epoch they belong to, so a superseded channel (or one
//! racing `close`) cannot touch the current state.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tether_core::{
    is_filtered_inbound, BackoffPolicy, ConnectionConfig, ControlFrame, Error, ManagerConfig,
    Result,
};

use super::events::{
    ConnectionEvent, ConnectionState, ConnectionStats, EventHandlers, HandlerRegistry,
    SendOptions, Subscription,
};
use crate::lock;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::transport::{BoxFuture, ChannelEvent, ChannelSink, Connector, TransportError};

/// Manages a bounded pool of named connections.
///
/// Dropping the manager cancels every connection task.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
    /// Overrides each connection's configured exponential backoff.
    backoff: Option<Arc<dyn BackoffPolicy>>,
    max_connections: usize,
    pool: Mutex<HashMap<String, Arc<Slot>>>,
}

impl ConnectionManager {
    /// Creates an empty pool using tokio timers.
    pub fn new(connector: Arc<dyn Connector>, config: &ManagerConfig) -> Self {
        ConnectionManager {
            connector,
            scheduler: Arc::new(TokioScheduler::new()),
            backoff: None,
            max_connections: config.max_connections.max(1),
            pool: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Uses `backoff` for every connection instead of its configured delays.
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Opens a named connection and waits for it to open.
    ///
    /// Fails with `PoolExhausted` at capacity and `DuplicateConnection` if the
    /// name is live. A `Failed` connection of the same name is replaced.
    ///
    /// If the first attempt fails (`ConnectionTimeout` or the transport
    /// error), the connection stays in the pool and keeps reconnecting
    /// according to its configuration.
    pub async fn create_connection(&self, name: &str, config: ConnectionConfig) -> Result<()> {
        self.open(name, config, None).await.map(|_| ())
    }

    /// Like [`create_connection`](Self::create_connection), registering
    /// `handlers` before the first attempt so they observe every event.
    ///
    /// When the first attempt fails the handlers remain registered for the
    /// life of the connection.
    pub async fn create_connection_with(
        &self,
        name: &str,
        config: ConnectionConfig,
        handlers: EventHandlers,
    ) -> Result<Subscription> {
        self.open(name, config, Some(handlers))
            .await?
            .ok_or_else(|| Error::NotConnected(name.to_string()))
    }

    async fn open(
        &self,
        name: &str,
        config: ConnectionConfig,
        handlers: Option<EventHandlers>,
    ) -> Result<Option<Subscription>> {
        let (subscription, opened) = {
            let mut pool = lock(&self.pool);
            if let Some(existing) = pool.get(name) {
                if existing.state() != ConnectionState::Failed {
                    return Err(Error::DuplicateConnection(name.to_string()));
                }
                debug!("replacing failed connection '{}'", name);
                pool.remove(name);
            }
            if pool.len() >= self.max_connections {
                return Err(Error::PoolExhausted {
                    capacity: self.max_connections,
                });
            }

            let backoff = self
                .backoff
                .clone()
                .unwrap_or_else(|| Arc::new(config.backoff()));
            let slot = Arc::new(Slot::new(name, config, backoff, Arc::clone(&self.scheduler)));
            let subscription = handlers.map(|h| slot.handlers.register(h));
            pool.insert(name.to_string(), Arc::clone(&slot));

            let (opened_tx, opened_rx) = oneshot::channel();
            tokio::spawn(run_connection(slot, Arc::clone(&self.connector), opened_tx));
            (subscription, opened_rx)
        };

        match opened.await {
            Ok(Ok(())) => Ok(subscription),
            Ok(Err(e)) => {
                // The connection keeps reconnecting; its handlers stay with it
                if let Some(subscription) = subscription {
                    subscription.detach();
                }
                Err(e)
            }
            // Task ended before the first outcome: closed while connecting
            Err(_) => Err(Error::NotConnected(name.to_string())),
        }
    }

    /// Sends a text message.
    ///
    /// Sent immediately when the connection is open. Otherwise the message is
    /// queued for replay (dropping the oldest queued message when full) or,
    /// with `queue_if_disconnected` unset, rejected with `NotConnected`.
    pub async fn send(
        &self,
        name: &str,
        message: impl Into<String>,
        options: SendOptions,
    ) -> Result<()> {
        let slot = self.slot(name)?;
        slot.send(message.into(), options).await
    }

    /// Serializes `value` as JSON and sends it.
    pub async fn send_json<T: Serialize>(
        &self,
        name: &str,
        value: &T,
        options: SendOptions,
    ) -> Result<()> {
        let text = serde_json::to_string(value)?;
        self.send(name, text, options).await
    }

    /// Registers subscriber callbacks for a connection.
    pub fn on_message(&self, name: &str, handlers: EventHandlers) -> Result<Subscription> {
        Ok(self.slot(name)?.handlers.register(handlers))
    }

    /// Closes a connection: cancels its timers, closes the channel, and
    /// removes it from the pool. Returns false if there was nothing to close.
    pub async fn close(&self, name: &str) -> bool {
        let slot = lock(&self.pool).remove(name);
        match slot {
            Some(slot) => {
                slot.shutdown().await;
                info!("connection '{}' closed", name);
                true
            }
            None => false,
        }
    }

    /// Closes every connection.
    pub async fn close_all(&self) {
        let slots: Vec<Arc<Slot>> = lock(&self.pool).drain().map(|(_, slot)| slot).collect();
        for slot in slots {
            slot.shutdown().await;
        }
    }

    pub fn state(&self, name: &str) -> Result<ConnectionState> {
        Ok(self.slot(name)?.state())
    }

    pub fn stats(&self, name: &str) -> Result<ConnectionStats> {
        Ok(self.slot(name)?.stats())
    }

    /// Names of pooled connections, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = lock(&self.pool).keys().cloned().collect();
        names.sort();
        names
    }

    fn slot(&self, name: &str) -> Result<Arc<Slot>> {
        lock(&self.pool)
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ConnectionNotFound(name.to_string()))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        for slot in lock(&self.pool).values() {
            slot.cancel.cancel();
        }
    }
}

/// Mutable connection state guarded by a std mutex. Never held across an
/// await point.
struct Shared {
    state: ConnectionState,
    attempts: u32,
    epoch: u64,
    last_activity: Option<u64>,
    outbound: VecDeque<String>,
    /// Set while queued messages are being replayed; new sends queue behind them.
    replaying: bool,
    dropped: u64,
    /// Epoch whose channel failed a direct send.
    failed_epoch: Option<u64>,
}

struct LiveSink {
    epoch: u64,
    sink: Box<dyn ChannelSink>,
}

/// One pooled connection.
struct Slot {
    name: String,
    config: ConnectionConfig,
    backoff: Arc<dyn BackoffPolicy>,
    scheduler: Arc<dyn Scheduler>,
    shared: Mutex<Shared>,
    sink: tokio::sync::Mutex<Option<LiveSink>>,
    handlers: Arc<HandlerRegistry>,
    cancel: CancellationToken,
    send_failed: Notify,
}

/// Why a pumped channel stopped.
enum ChannelEnd {
    Cancelled,
    Closed { code: Option<u16>, reason: String },
    Broken(String),
}

/// What to do after a channel ends.
enum NextStep {
    Retry(u32),
    GiveUp(u32),
    Stale,
}

impl Slot {
    fn new(
        name: &str,
        config: ConnectionConfig,
        backoff: Arc<dyn BackoffPolicy>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Slot {
            name: name.to_string(),
            config,
            backoff,
            scheduler,
            shared: Mutex::new(Shared {
                state: ConnectionState::Connecting,
                attempts: 0,
                epoch: 0,
                last_activity: None,
                outbound: VecDeque::new(),
                replaying: false,
                dropped: 0,
                failed_epoch: None,
            }),
            sink: tokio::sync::Mutex::new(None),
            handlers: Arc::new(HandlerRegistry::default()),
            cancel: CancellationToken::new(),
            send_failed: Notify::new(),
        }
    }

    fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    fn stats(&self) -> ConnectionStats {
        let shared = lock(&self.shared);
        ConnectionStats {
            name: self.name.clone(),
            url: self.config.url.clone(),
            state: shared.state,
            attempts: shared.attempts,
            queued: shared.outbound.len(),
            dropped: shared.dropped,
            last_activity: shared.last_activity,
            subscribers: self.handlers.len(),
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        self.handlers.emit(&event);
    }

    fn is_current(&self, epoch: u64) -> bool {
        lock(&self.shared).epoch == epoch
    }

    /// Starts a new channel epoch, or returns None once closed.
    fn begin_attempt(&self) -> Option<u64> {
        if self.cancel.is_cancelled() {
            return None;
        }
        let mut shared = lock(&self.shared);
        shared.epoch += 1;
        Some(shared.epoch)
    }

    /// Moves to `to` if `epoch` is still current. Emits `StateChanged`.
    fn transition(&self, epoch: u64, to: ConnectionState) -> bool {
        let from = {
            let mut shared = lock(&self.shared);
            if shared.epoch != epoch {
                return false;
            }
            let from = shared.state;
            shared.state = to;
            from
        };
        if from != to {
            debug!("connection '{}': {} -> {}", self.name, from, to);
            self.emit(ConnectionEvent::StateChanged { from, to });
        }
        true
    }

    fn touch(&self) {
        let now = self.scheduler.now_ms();
        lock(&self.shared).last_activity = Some(now);
    }

    /// Installs a freshly opened sink and moves to `Open`.
    async fn install(&self, epoch: u64, mut sink: Box<dyn ChannelSink>) -> bool {
        {
            let mut live = self.sink.lock().await;
            if self.is_current(epoch) && !self.cancel.is_cancelled() {
                *live = Some(LiveSink { epoch, sink });
            } else {
                drop(live);
                let _ = sink.close().await;
                return false;
            }
        }

        let now = self.scheduler.now_ms();
        let from = {
            let mut shared = lock(&self.shared);
            if shared.epoch != epoch {
                return false;
            }
            shared.attempts = 0;
            shared.replaying = !shared.outbound.is_empty();
            shared.last_activity = Some(now);
            let from = shared.state;
            shared.state = ConnectionState::Open;
            from
        };
        self.emit(ConnectionEvent::StateChanged {
            from,
            to: ConnectionState::Open,
        });
        true
    }

    /// Takes and closes the sink if it belongs to `epoch` (or any epoch when None).
    async fn release_sink(&self, epoch: Option<u64>) {
        let taken = {
            let mut live = self.sink.lock().await;
            let owned = live
                .as_ref()
                .is_some_and(|current| epoch.is_none_or(|e| e == current.epoch));
            if owned {
                live.take()
            } else {
                None
            }
        };
        if let Some(mut live) = taken {
            let _ = live.sink.close().await;
        }
    }

    /// Writes one frame on the channel opened in `epoch`.
    async fn write(&self, epoch: u64, text: String) -> std::result::Result<(), TransportError> {
        {
            let mut live = self.sink.lock().await;
            match live.as_mut() {
                Some(current) if current.epoch == epoch => current.sink.send(text).await?,
                _ => return Err(TransportError::ConnectionClosed),
            }
        }
        self.touch();
        Ok(())
    }

    async fn send(&self, text: String, options: SendOptions) -> Result<()> {
        let direct = {
            let shared = lock(&self.shared);
            match shared.state {
                ConnectionState::Open if !shared.replaying => Some(shared.epoch),
                ConnectionState::Failed => return Err(Error::NotConnected(self.name.clone())),
                _ if !options.queue_if_disconnected => {
                    return Err(Error::NotConnected(self.name.clone()))
                }
                _ => None,
            }
        };

        let Some(epoch) = direct else {
            self.enqueue(text);
            return Ok(());
        };

        match self.write(epoch, text.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("send on '{}' failed: {}", self.name, e);
                self.report_send_failure(epoch);
                if options.queue_if_disconnected {
                    self.enqueue(text);
                    Ok(())
                } else {
                    Err(e.into())
                }
            }
        }
    }

    /// Queues a message, dropping the oldest when the queue is full.
    fn enqueue(&self, text: String) {
        let capacity = self.config.queue_capacity.max(1);
        let dropped = {
            let mut shared = lock(&self.shared);
            let dropped = if shared.outbound.len() >= capacity {
                shared.dropped += 1;
                shared.outbound.pop_front()
            } else {
                None
            };
            shared.outbound.push_back(text);
            dropped
        };

        match dropped {
            Some(dropped) => {
                let err = Error::QueueFull {
                    name: self.name.clone(),
                    capacity,
                };
                warn!("{}", err);
                self.emit(ConnectionEvent::QueueFull { capacity, dropped });
            }
            None => debug!("queued message on '{}'", self.name),
        }
    }

    fn report_send_failure(&self, epoch: u64) {
        {
            let mut shared = lock(&self.shared);
            if shared.epoch != epoch {
                return;
            }
            shared.failed_epoch = Some(epoch);
        }
        self.send_failed.notify_one();
    }

    fn take_send_failure(&self, epoch: u64) -> bool {
        let mut shared = lock(&self.shared);
        if shared.failed_epoch == Some(epoch) {
            shared.failed_epoch = None;
            true
        } else {
            false
        }
    }

    /// Replays queued messages in order, one at a time.
    ///
    /// A failed write puts the message back at the front and stops.
    async fn replay(&self, epoch: u64) -> std::result::Result<usize, TransportError> {
        let pause = self.config.replay_pause();
        let mut replayed = 0;
        loop {
            let next = {
                let mut shared = lock(&self.shared);
                if shared.epoch != epoch {
                    return Ok(replayed);
                }
                match shared.outbound.pop_front() {
                    Some(text) => text,
                    None => {
                        shared.replaying = false;
                        return Ok(replayed);
                    }
                }
            };

            if let Err(e) = self.write(epoch, next.clone()).await {
                let mut shared = lock(&self.shared);
                shared.outbound.push_front(next);
                shared.replaying = false;
                return Err(e);
            }
            replayed += 1;

            if !pause.is_zero() {
                self.scheduler.sleep(pause).await;
            }
        }
    }

    /// Replays the queue, then pumps inbound frames and heartbeats until
    /// the channel ends.
    async fn pump(&self, epoch: u64, events: &mut mpsc::Receiver<ChannelEvent>) -> ChannelEnd {
        let replayed = tokio::select! {
            _ = self.cancel.cancelled() => return ChannelEnd::Cancelled,
            result = self.replay(epoch) => result,
        };
        match replayed {
            Ok(0) => {}
            Ok(n) => debug!("replayed {} queued messages on '{}'", n, self.name),
            Err(e) => return ChannelEnd::Broken(format!("replay failed: {e}")),
        }

        let interval = self.config.heartbeat_interval();
        let mut heartbeat = interval.map(|d| self.scheduler.sleep(d));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return ChannelEnd::Cancelled,
                event = events.recv() => match event {
                    Some(ChannelEvent::Message(text)) => {
                        self.touch();
                        if is_filtered_inbound(&text) {
                            continue;
                        }
                        self.emit(ConnectionEvent::Message(text));
                    }
                    Some(ChannelEvent::Closed { code, reason }) => {
                        return ChannelEnd::Closed { code, reason };
                    }
                    Some(ChannelEvent::Error(message)) => return ChannelEnd::Broken(message),
                    None => {
                        return ChannelEnd::Closed {
                            code: None,
                            reason: "channel dropped".to_string(),
                        };
                    }
                },
                _ = tick(&mut heartbeat) => {
                    let ping = ControlFrame::ping(self.scheduler.now_ms());
                    let sent = match ping.to_json() {
                        Ok(json) => self.write(epoch, json).await,
                        Err(e) => Err(TransportError::SendFailed(e.to_string())),
                    };
                    if let Err(e) = sent {
                        return ChannelEnd::Broken(format!("heartbeat failed: {e}"));
                    }
                    heartbeat = interval.map(|d| self.scheduler.sleep(d));
                }
                _ = self.send_failed.notified() => {
                    if self.take_send_failure(epoch) {
                        return ChannelEnd::Broken("send failed".to_string());
                    }
                }
            }
        }
    }

    /// Decides whether to reconnect after a channel ended.
    fn plan_next(&self, epoch: u64) -> NextStep {
        let mut shared = lock(&self.shared);
        if shared.epoch != epoch {
            return NextStep::Stale;
        }
        if self.config.auto_reconnect && shared.attempts < self.config.max_reconnect_attempts {
            shared.attempts += 1;
            NextStep::Retry(shared.attempts)
        } else {
            NextStep::GiveUp(shared.attempts)
        }
    }

    /// Closes the connection for good. Safe to call more than once.
    async fn shutdown(&self) {
        self.cancel.cancel();
        let from = {
            let mut shared = lock(&self.shared);
            shared.epoch += 1;
            shared.replaying = false;
            let from = shared.state;
            shared.state = ConnectionState::Closed;
            from
        };
        self.release_sink(None).await;
        if from != ConnectionState::Closed {
            self.emit(ConnectionEvent::StateChanged {
                from,
                to: ConnectionState::Closed,
            });
            self.emit(ConnectionEvent::Closed {
                code: Some(1000),
                reason: "closed by client".to_string(),
            });
        }
    }
}

/// Completes when the heartbeat is due; never when heartbeats are disabled.
async fn tick(heartbeat: &mut Option<BoxFuture<'static, ()>>) {
    match heartbeat.as_mut() {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

fn report(opened: &mut Option<oneshot::Sender<Result<()>>>, result: Result<()>) {
    if let Some(tx) = opened.take() {
        let _ = tx.send(result);
    }
}

/// Drives one connection until it is closed or fails.
async fn run_connection(
    slot: Arc<Slot>,
    connector: Arc<dyn Connector>,
    opened: oneshot::Sender<Result<()>>,
) {
    let mut opened = Some(opened);

    loop {
        let Some(epoch) = slot.begin_attempt() else {
            return;
        };

        let attempt = tokio::select! {
            _ = slot.cancel.cancelled() => return,
            result = tokio::time::timeout(
                slot.config.connect_timeout(),
                connector.connect(&slot.config.url),
            ) => result,
        };

        match attempt {
            Ok(Ok(channel)) => {
                let mut events = channel.events;
                if !slot.install(epoch, channel.sink).await {
                    return;
                }
                info!("connection '{}' open: {}", slot.name, slot.config.url);
                report(&mut opened, Ok(()));
                slot.emit(ConnectionEvent::Open);

                let end = slot.pump(epoch, &mut events).await;
                slot.release_sink(Some(epoch)).await;
                match end {
                    ChannelEnd::Cancelled => return,
                    ChannelEnd::Closed { code, reason } => {
                        info!("connection '{}' closed by remote: {}", slot.name, reason);
                        if !slot.transition(epoch, ConnectionState::Closed) {
                            return;
                        }
                        slot.emit(ConnectionEvent::Closed { code, reason });
                    }
                    ChannelEnd::Broken(message) => {
                        warn!("connection '{}' lost: {}", slot.name, message);
                        if !slot.transition(epoch, ConnectionState::Error) {
                            return;
                        }
                        slot.emit(ConnectionEvent::Error(message));
                    }
                }
            }
            failure => {
                let err = match failure {
                    Ok(Err(e)) => Error::from(e),
                    _ => Error::ConnectionTimeout {
                        name: slot.name.clone(),
                        timeout_ms: slot.config.connect_timeout_ms,
                    },
                };
                warn!("connection '{}' attempt failed: {}", slot.name, err);
                if !slot.transition(epoch, ConnectionState::Error) {
                    return;
                }
                slot.emit(ConnectionEvent::Error(err.to_string()));
                report(&mut opened, Err(err));
            }
        }

        match slot.plan_next(epoch) {
            NextStep::Stale => return,
            NextStep::GiveUp(attempts) => {
                slot.transition(epoch, ConnectionState::Failed);
                let err = Error::MaxReconnectAttemptsReached {
                    name: slot.name.clone(),
                    attempts,
                };
                warn!("{}", err);
                slot.emit(ConnectionEvent::MaxReconnectAttemptsReached { attempts });
                return;
            }
            NextStep::Retry(attempt) => {
                slot.transition(epoch, ConnectionState::Reconnecting);
                let delay = slot.backoff.delay(attempt);
                debug!(
                    "connection '{}' reconnect attempt {} in {:?}",
                    slot.name, attempt, delay
                );
                tokio::select! {
                    _ = slot.cancel.cancelled() => return,
                    _ = slot.scheduler.sleep(delay) => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
