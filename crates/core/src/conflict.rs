// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Conflict resolution between a local offline edit and a remote value.
//!
//! Resolution rules:
//! - ServerWins: the remote value replaces the local one
//! - ClientWins: the local value is kept
//! - Merge: shallow object merge, local keys overwrite remote keys
//! - Timestamp: the side with the greater recorded timestamp wins, ties go remote
//!
//! Every policy is a pure function of its inputs, so resolving the same pair
//! twice yields the same value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// One side of a conflict: a payload and the time it was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub payload: Value,
    /// Milliseconds since Unix epoch.
    pub timestamp: u64,
}

impl Versioned {
    pub fn new(payload: Value, timestamp: u64) -> Self {
        Versioned { payload, timestamp }
    }
}

/// Which side a resolution ended up favoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
    Merged,
}

/// Outcome of a conflict resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub value: Value,
    pub winner: Winner,
}

/// Strategy for reconciling a local edit with a remote value.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, local: &Versioned, remote: &Versioned) -> Resolution;
}

/// Built-in conflict policies, selectable per data type from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    ServerWins,
    ClientWins,
    Merge,
    Timestamp,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::ServerWins => "server_wins",
            ConflictPolicy::ClientWins => "client_wins",
            ConflictPolicy::Merge => "merge",
            ConflictPolicy::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "server_wins" => Ok(ConflictPolicy::ServerWins),
            "client_wins" => Ok(ConflictPolicy::ClientWins),
            "merge" => Ok(ConflictPolicy::Merge),
            "timestamp" => Ok(ConflictPolicy::Timestamp),
            other => Err(Error::Config(format!(
                "unknown conflict policy '{other}'\n  hint: valid policies are: server_wins, client_wins, merge, timestamp"
            ))),
        }
    }
}

impl ConflictResolver for ConflictPolicy {
    fn resolve(&self, local: &Versioned, remote: &Versioned) -> Resolution {
        match self {
            ConflictPolicy::ServerWins => Resolution {
                value: remote.payload.clone(),
                winner: Winner::Remote,
            },
            ConflictPolicy::ClientWins => Resolution {
                value: local.payload.clone(),
                winner: Winner::Local,
            },
            ConflictPolicy::Merge => shallow_merge(&local.payload, &remote.payload),
            ConflictPolicy::Timestamp => {
                if local.timestamp > remote.timestamp {
                    Resolution {
                        value: local.payload.clone(),
                        winner: Winner::Local,
                    }
                } else {
                    Resolution {
                        value: remote.payload.clone(),
                        winner: Winner::Remote,
                    }
                }
            }
        }
    }
}

/// Overlays local top-level keys on top of the remote object.
///
/// Nested objects are replaced wholesale, not merged. When either side is not
/// an object there is nothing to merge and the local value is kept.
fn shallow_merge(local: &Value, remote: &Value) -> Resolution {
    match (local, remote) {
        (Value::Object(local_map), Value::Object(remote_map)) => {
            let mut merged = remote_map.clone();
            for (key, value) in local_map {
                merged.insert(key.clone(), value.clone());
            }
            Resolution {
                value: Value::Object(merged),
                winner: Winner::Merged,
            }
        }
        _ => Resolution {
            value: local.clone(),
            winner: Winner::Local,
        },
    }
}

#[cfg(test)]
#[path = "conflict_tests.rs"]
mod tests;
