// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Relay state shared by every client task.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// A text frame on its way to every client except its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relayed {
    pub from: u64,
    pub text: String,
}

/// Shared relay state: client numbering and the fanout channel.
#[derive(Clone)]
pub struct RelayState {
    inner: Arc<RelayStateInner>,
}

struct RelayStateInner {
    /// Broadcast channel for fanning frames out to clients.
    broadcast_tx: broadcast::Sender<Relayed>,
    next_client: AtomicU64,
    connected: AtomicUsize,
}

impl RelayState {
    pub fn new() -> Self {
        // Create broadcast channel with reasonable buffer
        let (broadcast_tx, _) = broadcast::channel(1024);
        RelayState {
            inner: Arc::new(RelayStateInner {
                broadcast_tx,
                next_client: AtomicU64::new(1),
                connected: AtomicUsize::new(0),
            }),
        }
    }

    /// Registers a client, returning its ID.
    pub fn join(&self) -> u64 {
        self.inner.connected.fetch_add(1, Ordering::SeqCst);
        self.inner.next_client.fetch_add(1, Ordering::SeqCst)
    }

    pub fn leave(&self) {
        self.inner.connected.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of connected clients.
    pub fn connected(&self) -> usize {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// Subscribes to relayed frames.
    pub fn subscribe(&self) -> broadcast::Receiver<Relayed> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Fans a frame out to every subscriber. Returns how many received it,
    /// the sender included.
    pub fn publish(&self, from: u64, text: String) -> usize {
        self.inner
            .broadcast_tx
            .send(Relayed { from, text })
            .unwrap_or(0)
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new()
    }
}
