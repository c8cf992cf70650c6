// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for tether operations.

use thiserror::Error;

use crate::store::StoreError;

/// All possible errors that can occur in tether operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("connection '{name}' did not open within {timeout_ms}ms")]
    ConnectionTimeout { name: String, timeout_ms: u64 },

    #[error("connection pool exhausted ({capacity} connections)\n  hint: close an idle connection or raise manager.max_connections")]
    PoolExhausted { capacity: usize },

    #[error("connection already exists: {0}")]
    DuplicateConnection(String),

    #[error("connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("connection '{0}' is not open and queueing was not requested")]
    NotConnected(String),

    #[error("connection '{name}' gave up after {attempts} reconnect attempts")]
    MaxReconnectAttemptsReached { name: String, attempts: u32 },

    #[error("outbound queue for '{name}' is full ({capacity}), dropped oldest message")]
    QueueFull { name: String, capacity: usize },

    #[error("mutation {id} ({data_type}/{key}) dropped after {retries} retries: {reason}")]
    SyncPermanentFailure {
        id: String,
        data_type: String,
        key: String,
        retries: u32,
        reason: String,
    },

    #[error("corrupt cache entry '{key}': {reason}")]
    CacheCorrupt { key: String, reason: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// A specialized Result type for tether operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
