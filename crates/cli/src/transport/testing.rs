// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Mock transports for testing without real sockets.
//!
//! [`MockConnector`] plays a scripted sequence of connect outcomes and hands
//! the test a [`MockServer`] for every channel it opens, so the test can
//! push frames, close the channel, and inspect what the client sent.
//! [`MockRequests`] records requests and echoes bodies back unless a reply
//! was scripted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::{
    BoxFuture, Channel, ChannelEvent, ChannelSink, Connector, Request, RequestTransport, Response,
    TransportError, TransportResult,
};

/// Outcome of one connect attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectScript {
    Open,
    Fail(String),
    /// Never resolves; exercises connect timeouts.
    Hang,
}

/// Remote end of a mock channel.
#[derive(Clone)]
pub struct MockServer {
    events: mpsc::Sender<ChannelEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    /// Delivers a text frame to the client.
    pub async fn push(&self, text: &str) {
        let _ = self.events.send(ChannelEvent::Message(text.to_string())).await;
    }

    /// Closes the channel from the remote side.
    pub async fn close(&self, code: u16) {
        let _ = self
            .events
            .send(ChannelEvent::Closed {
                code: Some(code),
                reason: "server closed".to_string(),
            })
            .await;
    }

    /// Breaks the channel.
    pub async fn fail(&self, message: &str) {
        let _ = self.events.send(ChannelEvent::Error(message.to_string())).await;
    }

    /// Frames the client sent on this channel.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    /// True once the client closed its sink.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct MockSink {
    sent: Arc<Mutex<Vec<String>>>,
    all_sent: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl ChannelSink for MockSink {
    fn send(&mut self, text: String) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionClosed);
            }
            if self.fail_sends.load(Ordering::SeqCst) {
                return Err(TransportError::SendFailed("mock send failure".into()));
            }
            self.sent.lock().unwrap().push(text.clone());
            self.all_sent.lock().unwrap().push(text);
            Ok(())
        })
    }

    fn close(&mut self) -> BoxFuture<'_, TransportResult<()>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        })
    }
}

struct MockConnectorInner {
    script: Mutex<VecDeque<ConnectScript>>,
    fallback: Mutex<ConnectScript>,
    attempts: AtomicUsize,
    servers: Mutex<Vec<MockServer>>,
    all_sent: Arc<Mutex<Vec<String>>>,
    fail_sends: Arc<AtomicBool>,
}

/// Scripted connector. Cloning shares the script and logs.
#[derive(Clone)]
pub struct MockConnector {
    inner: Arc<MockConnectorInner>,
}

impl MockConnector {
    /// Every attempt opens unless scripted otherwise.
    pub fn new() -> Self {
        Self::with_fallback(ConnectScript::Open)
    }

    /// Every attempt fails unless scripted otherwise.
    pub fn unreachable() -> Self {
        Self::with_fallback(ConnectScript::Fail("connection refused".into()))
    }

    fn with_fallback(fallback: ConnectScript) -> Self {
        MockConnector {
            inner: Arc::new(MockConnectorInner {
                script: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(fallback),
                attempts: AtomicUsize::new(0),
                servers: Mutex::new(Vec::new()),
                all_sent: Arc::new(Mutex::new(Vec::new())),
                fail_sends: Arc::new(AtomicBool::new(false)),
            }),
        }
    }

    /// Queues outcomes for the next attempts, in order.
    pub fn script(&self, outcomes: impl IntoIterator<Item = ConnectScript>) {
        self.inner.script.lock().unwrap().extend(outcomes);
    }

    /// Outcome used once the script runs out.
    pub fn set_fallback(&self, outcome: ConnectScript) {
        *self.inner.fallback.lock().unwrap() = outcome;
    }

    /// Makes every sink send fail (or succeed again).
    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Remote ends of every channel opened so far.
    pub fn servers(&self) -> Vec<MockServer> {
        self.inner.servers.lock().unwrap().clone()
    }

    /// Remote end of the most recently opened channel.
    pub fn latest(&self) -> MockServer {
        self.servers().pop().expect("no channel opened")
    }

    /// Frames sent across every channel, in order.
    pub fn all_sent(&self) -> Vec<String> {
        self.inner.all_sent.lock().unwrap().clone()
    }

    fn open_channel(&self) -> Channel {
        let (events_tx, events) = mpsc::channel(64);
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.inner.servers.lock().unwrap().push(MockServer {
            events: events_tx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        });
        Channel {
            sink: Box::new(MockSink {
                sent,
                all_sent: Arc::clone(&self.inner.all_sent),
                fail_sends: Arc::clone(&self.inner.fail_sends),
                closed,
            }),
            events,
        }
    }
}

impl Connector for MockConnector {
    fn connect(&self, _url: &str) -> BoxFuture<'_, TransportResult<Channel>> {
        Box::pin(async move {
            self.inner.attempts.fetch_add(1, Ordering::SeqCst);
            let next = self.inner.script.lock().unwrap().pop_front();
            let outcome = next.unwrap_or_else(|| self.inner.fallback.lock().unwrap().clone());
            match outcome {
                ConnectScript::Open => Ok(self.open_channel()),
                ConnectScript::Fail(reason) => Err(TransportError::ConnectionFailed(reason)),
                ConnectScript::Hang => std::future::pending().await,
            }
        })
    }
}

type RequestHook = Box<dyn Fn(&Request) + Send + Sync>;

#[derive(Default)]
struct MockRequestsInner {
    log: Mutex<Vec<Request>>,
    replies: Mutex<VecDeque<TransportResult<Response>>>,
    hook: Mutex<Option<RequestHook>>,
}

/// Recording request transport. Cloning shares the log.
#[derive(Clone, Default)]
pub struct MockRequests {
    inner: Arc<MockRequestsInner>,
}

impl MockRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply for the next request. Unscripted requests echo their
    /// body back with status 200.
    pub fn reply(&self, reply: TransportResult<Response>) {
        self.inner.replies.lock().unwrap().push_back(reply);
    }

    /// Runs `hook` as each request arrives, before replying.
    pub fn on_request(&self, hook: impl Fn(&Request) + Send + Sync + 'static) {
        *self.inner.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn requests(&self) -> Vec<Request> {
        self.inner.log.lock().unwrap().clone()
    }
}

impl RequestTransport for MockRequests {
    fn request(&self, request: Request) -> BoxFuture<'_, TransportResult<Response>> {
        Box::pin(async move {
            if let Some(hook) = self.inner.hook.lock().unwrap().as_ref() {
                hook(&request);
            }
            self.inner.log.lock().unwrap().push(request.clone());
            let scripted = self.inner.replies.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| Ok(Response::ok(request.body)))
        })
    }
}
