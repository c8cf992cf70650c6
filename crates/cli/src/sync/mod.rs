// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Offline-first sync of cached data.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │ SyncManager │────►│ RequestTransport │────►│   Remote    │
//! │             │◄────│     (trait)      │◄────│   System    │
//! └─────────────┘     └──────────────────┘     └─────────────┘
//!        │
//!        ▼
//! ┌─────────────────────────────┐
//! │ CacheStore + MutationQueue  │  (persisted in a KeyValueStore)
//! └─────────────────────────────┘
//! ```
//!
//! # Features
//!
//! - TTL cache with optional stale reads
//! - Durable offline mutation queue drained in priority order
//! - Bounded retries with permanent-failure events
//! - Per data type conflict policies
//! - Connectivity driven by a managed connection's state

mod events;
mod manager;

pub use events::{DrainReport, GetOptions, MutationOutcome, SetOptions, SyncEvent};
pub use manager::{SyncManager, SyncRestore};
