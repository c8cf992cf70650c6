// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for duplex channels and one-shot requests.
//!
//! Provides a trait-based transport layer that enables:
//! - Real WebSocket channels for production ([`WebSocketConnector`])
//! - Mock connectors and request transports for unit testing
//!
//! A duplex channel is split in two halves when it opens: a
//! [`ChannelSink`] the owner writes to, and a receiver of
//! [`ChannelEvent`]s fed by the transport. The channel is over once the
//! receiver yields `Closed` or `Error`, or ends.

mod websocket;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

pub use websocket::WebSocketConnector;

/// Boxed future returned by transport traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type for transport operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Request failed before a response arrived.
    #[error("request failed: {0}")]
    RequestFailed(String),

    /// Request exceeded its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

impl From<TransportError> for tether_core::Error {
    fn from(e: TransportError) -> Self {
        tether_core::Error::Transport(e.to_string())
    }
}

/// Something that happened on an open channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A text frame from the remote side.
    Message(String),
    /// The remote side closed the channel.
    Closed { code: Option<u16>, reason: String },
    /// The channel broke.
    Error(String),
}

/// Write half of an open channel.
pub trait ChannelSink: Send + Sync {
    /// Sends a text frame.
    fn send(&mut self, text: String) -> BoxFuture<'_, TransportResult<()>>;

    /// Closes the channel. Closing twice is not an error.
    fn close(&mut self) -> BoxFuture<'_, TransportResult<()>>;
}

/// An open channel: the write half and the event stream.
pub struct Channel {
    pub sink: Box<dyn ChannelSink>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel").field("sink", &"<sink>").finish()
    }
}

/// Opens duplex channels.
///
/// This trait abstracts over the actual socket implementation, allowing
/// the connection manager to be tested without a network.
pub trait Connector: Send + Sync {
    /// Opens a channel to `url`. Resolves once the channel is open.
    fn connect(&self, url: &str) -> BoxFuture<'_, TransportResult<Channel>>;
}

/// HTTP-style request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Put => write!(f, "PUT"),
            Method::Post => write!(f, "POST"),
            Method::Delete => write!(f, "DELETE"),
        }
    }
}

/// A one-shot request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub url: String,
    pub method: Method,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Reply to a [`Request`].
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// Authoritative value echoed by the remote system, if any.
    pub data: Option<Value>,
    /// Remote modification time in milliseconds since Unix epoch.
    pub timestamp: Option<u64>,
}

impl Response {
    /// A 200 response carrying `data`.
    pub fn ok(data: Option<Value>) -> Self {
        Response {
            status: 200,
            data,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one-shot requests against the remote system.
pub trait RequestTransport: Send + Sync {
    fn request(&self, request: Request) -> BoxFuture<'_, TransportResult<Response>>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
