// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Configuration for connections, the sync queue and the cache.
//!
//! Configuration is read from a TOML file, typically `tether.toml`:
//!
//! ```toml
//! [manager]
//! max_connections = 4
//!
//! [connections.tables]
//! url = "wss://pos.example.com/live/tables"
//! heartbeat_interval_ms = 15000
//! max_reconnect_attempts = 20
//!
//! [sync]
//! base_url = "https://pos.example.com/api"
//! max_retries = 5
//!
//! [data_types.order]
//! ttl_ms = 300000
//! priority = 1
//! conflict_policy = "timestamp"
//! ```
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::{ExponentialBackoff, DEFAULT_MAX_DELAY};
use crate::conflict::ConflictPolicy;
use crate::error::{Error, Result};

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "tether.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Named duplex channels, keyed by connection name.
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per data type overrides. Types missing here use [`DataTypeConfig::default`].
    #[serde(default)]
    pub data_types: BTreeMap<String, DataTypeConfig>,
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.manager.max_connections == 0 {
            return Err(Error::Config(
                "manager.max_connections must be at least 1".to_string(),
            ));
        }
        for (name, conn) in &self.connections {
            conn.validate()
                .map_err(|reason| Error::Config(format!("connections.{name}: {reason}")))?;
        }
        if self.sync.max_retries == 0 {
            return Err(Error::Config("sync.max_retries must be at least 1".to_string()));
        }
        for (name, dt) in &self.data_types {
            if dt.ttl_ms == 0 {
                return Err(Error::Config(format!("data_types.{name}: ttl_ms must be positive")));
            }
            if dt.max_entries == Some(0) {
                return Err(Error::Config(format!(
                    "data_types.{name}: max_entries must be positive when set"
                )));
            }
        }
        Ok(())
    }

    /// Looks up a named connection.
    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        self.connections
            .get(name)
            .ok_or_else(|| Error::ConnectionNotFound(name.to_string()))
    }

    /// Builds the data type table, filling in defaults for well-known types.
    pub fn data_type_table(&self) -> DataTypeTable {
        let mut table = DataTypeTable::with_defaults();
        for (name, config) in &self.data_types {
            table.insert(name.clone(), config.clone());
        }
        table
    }
}

/// Settings shared by every connection in a pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of live connections (default: 8).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    8
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            max_connections: default_max_connections(),
        }
    }
}

/// Per-connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Channel URL, e.g. `wss://host/live`.
    pub url: String,
    /// Heartbeat ping interval in milliseconds (default: 30000). 0 = disabled.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// Delay before the first reconnect attempt in milliseconds (default: 1000).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Cap on any single reconnect delay in milliseconds (default: 30000).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before the connection fails for good (default: 10).
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Reconnect automatically after close or error (default: true).
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,
    /// Outbound messages buffered while disconnected (default: 100).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Max time to wait for the channel to open in milliseconds (default: 10000).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Pause between replayed messages after reconnect in milliseconds (default: 10).
    #[serde(default = "default_replay_pause_ms")]
    pub replay_pause_ms: u64,
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    1_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY.as_millis() as u64
}

fn default_max_reconnect_attempts() -> u32 {
    10
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    100
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_replay_pause_ms() -> u64 {
    10
}

impl ConnectionConfig {
    /// Creates a configuration for `url` with every other field defaulted.
    pub fn new(url: impl Into<String>) -> Self {
        ConnectionConfig {
            url: url.into(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            auto_reconnect: default_auto_reconnect(),
            queue_capacity: default_queue_capacity(),
            connect_timeout_ms: default_connect_timeout_ms(),
            replay_pause_ms: default_replay_pause_ms(),
        }
    }

    pub fn with_heartbeat_interval_ms(mut self, ms: u64) -> Self {
        self.heartbeat_interval_ms = ms;
        self
    }

    pub fn with_reconnect_delays_ms(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.reconnect_base_delay_ms = base_ms;
        self.reconnect_max_delay_ms = max_ms;
        self
    }

    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_connect_timeout_ms(mut self, ms: u64) -> Self {
        self.connect_timeout_ms = ms;
        self
    }

    pub fn with_replay_pause_ms(mut self, ms: u64) -> Self {
        self.replay_pause_ms = ms;
        self
    }

    /// Heartbeat interval, or `None` when heartbeats are disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn replay_pause(&self) -> Duration {
        Duration::from_millis(self.replay_pause_ms)
    }

    /// The default backoff policy for this connection.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(self.reconnect_base_delay_ms),
            Duration::from_millis(self.reconnect_max_delay_ms),
        )
    }

    fn validate(&self) -> std::result::Result<(), String> {
        let valid_scheme = ["ws://", "wss://"].iter().any(|s| self.url.starts_with(s));
        if !valid_scheme {
            return Err(format!("invalid url '{}': must be ws:// or wss://", self.url));
        }
        if self.queue_capacity == 0 {
            return Err("queue_capacity must be at least 1".to_string());
        }
        if self.connect_timeout_ms == 0 {
            return Err("connect_timeout_ms must be positive".to_string());
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err("reconnect_base_delay_ms exceeds reconnect_max_delay_ms".to_string());
        }
        Ok(())
    }
}

/// Sync queue settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL mutations are applied against (`{base_url}/{data_type}/{key}`).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Failed attempts before a queued mutation is dropped (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Timeout handed to the request transport in milliseconds (default: 10000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Interval of the expired-entry sweep in milliseconds (default: 60000).
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            base_url: default_base_url(),
            max_retries: default_max_retries(),
            request_timeout_ms: default_request_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Cache-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Total entries across all data types (default: 1000).
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

fn default_cache_max_entries() -> usize {
    1_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Per data type cache and sync behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTypeConfig {
    /// Freshness window in milliseconds (default: 300000).
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Sync priority; lower numbers drain first and are evicted last (default: 5).
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// How offline edits are reconciled with server values (default: server_wins).
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    /// Entries of this type kept in the cache; unbounded within the global cap if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

fn default_ttl_ms() -> u64 {
    300_000
}

fn default_priority() -> u8 {
    5
}

impl Default for DataTypeConfig {
    fn default() -> Self {
        DataTypeConfig {
            ttl_ms: default_ttl_ms(),
            priority: default_priority(),
            conflict_policy: ConflictPolicy::default(),
            max_entries: None,
        }
    }
}

impl DataTypeConfig {
    pub fn new(ttl_ms: u64, priority: u8, conflict_policy: ConflictPolicy) -> Self {
        DataTypeConfig {
            ttl_ms,
            priority,
            conflict_policy,
            max_entries: None,
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

/// Lookup table from data type name to its configuration.
#[derive(Debug, Clone, Default)]
pub struct DataTypeTable {
    types: BTreeMap<String, DataTypeConfig>,
    fallback: DataTypeConfig,
}

impl DataTypeTable {
    /// An empty table: every type uses [`DataTypeConfig::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A table pre-populated with point-of-sale data types.
    ///
    /// | type         | ttl   | priority | policy      |
    /// |--------------|-------|----------|-------------|
    /// | table_status | 30s   | 1        | server_wins |
    /// | order        | 5m    | 1        | timestamp   |
    /// | payment      | 5m    | 0        | server_wins |
    /// | customer     | 30m   | 3        | merge       |
    /// | menu         | 1h    | 8        | server_wins |
    /// | settings     | 24h   | 9        | client_wins |
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert("table_status", DataTypeConfig::new(30_000, 1, ConflictPolicy::ServerWins));
        table.insert("order", DataTypeConfig::new(300_000, 1, ConflictPolicy::Timestamp));
        table.insert("payment", DataTypeConfig::new(300_000, 0, ConflictPolicy::ServerWins));
        table.insert("customer", DataTypeConfig::new(1_800_000, 3, ConflictPolicy::Merge));
        table.insert("menu", DataTypeConfig::new(3_600_000, 8, ConflictPolicy::ServerWins));
        table.insert("settings", DataTypeConfig::new(86_400_000, 9, ConflictPolicy::ClientWins));
        table
    }

    /// Adds or replaces the configuration for a data type.
    pub fn insert(&mut self, data_type: impl Into<String>, config: DataTypeConfig) {
        self.types.insert(data_type.into(), config);
    }

    /// Configuration for `data_type`, falling back to the default entry.
    pub fn get(&self, data_type: &str) -> &DataTypeConfig {
        self.types.get(data_type).unwrap_or(&self.fallback)
    }

    /// Iterates explicitly configured types.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataTypeConfig)> {
        self.types.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
