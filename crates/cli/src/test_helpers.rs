// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::scheduler::{Scheduler, TokioScheduler};
use crate::transport::BoxFuture;

/// Tokio scheduler that records every requested sleep.
#[derive(Clone, Default)]
pub struct RecordingScheduler {
    inner: TokioScheduler,
    sleeps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep durations requested so far, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Scheduler for RecordingScheduler {
    fn now_ms(&self) -> u64 {
        self.inner.now_ms()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.sleeps.lock().unwrap().push(duration);
        self.inner.sleep(duration)
    }
}

/// Lets spawned tasks run until they block on a channel or timer.
///
/// Time does not advance while the caller yields.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
