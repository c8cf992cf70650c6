// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Long-lived duplex connections.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  ConnectionManager  │────►│  Connector  │────►│   Remote    │
//! │  (pool, per-name    │◄────│   (trait)   │◄────│   Server    │
//! │   task + queue)     │     └─────────────┘     └─────────────┘
//! └─────────────────────┘
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │   EventHandlers     │  (subscriber callbacks)
//! └─────────────────────┘
//! ```
//!
//! # Features
//!
//! - Named pool with a connection limit
//! - Automatic reconnect with pluggable backoff
//! - Heartbeat pings with control-frame filtering
//! - Bounded outbound queue replayed in order on reconnect

mod events;
mod manager;

pub use events::{
    ConnectionEvent, ConnectionState, ConnectionStats, EventHandlers, SendOptions, Subscription,
};
pub use manager::ConnectionManager;
