// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! tether-core: Shared library for the tether client resilience layer
//!
//! This crate provides the synchronous building blocks used by the tether
//! connection and sync managers: configuration, backoff policies, control
//! frames, the TTL cache, the durable mutation queue and conflict policies.
//! Nothing here owns a clock or a runtime; callers pass `now` explicitly.

pub mod backoff;
pub mod cache;
pub mod config;
pub mod conflict;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod store;

pub use backoff::{BackoffPolicy, ConstantBackoff, ExponentialBackoff};
pub use cache::{CacheEntry, CacheStats, CacheStore, RestoreReport};
pub use config::{
    CacheConfig, Config, ConnectionConfig, DataTypeConfig, DataTypeTable, ManagerConfig,
    SyncConfig,
};
pub use conflict::{ConflictPolicy, ConflictResolver, Resolution, Versioned, Winner};
pub use error::{Error, Result};
pub use protocol::{is_filtered_inbound, ControlFrame};
pub use queue::{FailureOutcome, MutationKind, MutationQueue, QueueItem};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreError, StoreResult};
