// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Options, outcomes and events of the sync manager.

use serde::Serialize;
use tether_core::{QueueItem, Winner};

/// Options for [`get`](super::SyncManager::get).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Return expired entries instead of reporting a miss.
    pub allow_stale: bool,
}

impl GetOptions {
    pub fn stale() -> Self {
        GetOptions { allow_stale: true }
    }
}

/// Options for [`set`](super::SyncManager::set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// The payload already matches the remote system (default: false).
    pub synced: bool,
}

impl SetOptions {
    pub fn synced() -> Self {
        SetOptions { synced: true }
    }
}

/// What happened to a mutation submitted through
/// [`mutate`](super::SyncManager::mutate) or [`delete`](super::SyncManager::delete).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied remotely.
    Applied,
    /// Queued for a later drain under the given queue item ID.
    Queued(String),
    /// The remote system reported a conflict that was resolved locally.
    Resolved(Winner),
}

/// Counts from one drain of the mutation queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Items sent to the remote system.
    pub attempted: usize,
    pub succeeded: usize,
    /// Failed items kept for the next drain.
    pub failed: usize,
    /// Items dropped after exhausting their retries.
    pub dropped: usize,
    /// Conflicts reported by the remote system and resolved.
    pub conflicts: usize,
    /// Items still queued when the drain ended.
    pub remaining: usize,
    /// The drain stopped early because connectivity was lost.
    pub halted: bool,
}

/// Notification broadcast to [`subscribe`](super::SyncManager::subscribe)rs.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    DrainCompleted(DrainReport),
    /// A queued mutation was dropped after its final failed attempt.
    PermanentFailure { item: QueueItem, reason: String },
    ConflictResolved {
        data_type: String,
        key: String,
        winner: Winner,
    },
    ConnectivityChanged { online: bool },
}
