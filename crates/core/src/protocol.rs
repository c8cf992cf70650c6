// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Channel-internal control frames.
//!
//! Application traffic on a duplex channel is opaque text. A small set of
//! JSON frames is reserved for keeping the channel itself alive:
//! - Client sends `ping` on every heartbeat tick
//! - Server answers with `pong` (or `heartbeat_ack`)
//! - Server may greet a new channel with `connected`
//!
//! Control frames are consumed by the connection layer and never delivered
//! to subscribers.

use serde::{Deserialize, Serialize};

/// Frames reserved for heartbeat and handshake.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Heartbeat sent by the client.
    Ping {
        /// Client clock in milliseconds, echoed back by well-behaved servers.
        timestamp: u64,
    },

    /// Heartbeat reply.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Alternate heartbeat reply used by some servers.
    HeartbeatAck,

    /// Handshake sent by the server once the channel is established.
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
    },
}

impl ControlFrame {
    /// Creates a Ping frame.
    pub fn ping(timestamp: u64) -> Self {
        ControlFrame::Ping { timestamp }
    }

    /// Creates a Pong frame.
    pub fn pong(timestamp: Option<u64>) -> Self {
        ControlFrame::Pong { timestamp }
    }

    /// Creates a Connected handshake frame.
    pub fn connected(session: Option<String>) -> Self {
        ControlFrame::Connected { session }
    }

    /// Serializes the frame to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses a control frame, returning `None` for application traffic.
    pub fn parse(text: &str) -> Option<Self> {
        // Cheap pre-check so large application payloads skip a full parse.
        if !text.contains("\"type\"") {
            return None;
        }
        serde_json::from_str(text).ok()
    }
}

/// Returns true if an inbound frame must be hidden from subscribers.
///
/// Inbound `ping` frames are application-visible: only replies and
/// handshakes are filtered.
pub fn is_filtered_inbound(text: &str) -> bool {
    matches!(
        ControlFrame::parse(text),
        Some(ControlFrame::Pong { .. } | ControlFrame::HeartbeatAck | ControlFrame::Connected { .. })
    )
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
