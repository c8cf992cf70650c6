// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Injectable clock and timers.
//!
//! Every timer the managers use (heartbeat, reconnect backoff, replay pause,
//! cache sweep) goes through a [`Scheduler`], so tests can substitute a
//! recording or virtual-time implementation. [`TokioScheduler`] reads tokio's
//! clock, which means `#[tokio::test(start_paused = true)]` drives it too.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::transport::BoxFuture;

/// Clock and timer source.
pub trait Scheduler: Send + Sync {
    /// Current time in milliseconds since Unix epoch.
    fn now_ms(&self) -> u64;

    /// Completes after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;

    /// Runs `task` once after `delay`. Must be called within a tokio runtime.
    fn after(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> TimerHandle {
        let sleep = self.sleep(delay);
        TimerHandle::spawn(async move {
            sleep.await;
            task();
        })
    }
}

/// Runs `task` every `period` until the returned handle is cancelled or
/// dropped. The first run happens one period from now.
pub fn every(
    scheduler: Arc<dyn Scheduler>,
    period: Duration,
    mut task: Box<dyn FnMut() + Send>,
) -> TimerHandle {
    TimerHandle::spawn(async move {
        loop {
            scheduler.sleep(period).await;
            task();
        }
    })
}

/// A pending timer. Dropping the handle cancels the timer.
#[must_use = "dropping a TimerHandle cancels the timer"]
#[derive(Debug)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    /// Spawns `fut` as a cancellable timer task.
    pub fn spawn(fut: impl Future<Output = ()> + Send + 'static) -> Self {
        TimerHandle {
            task: Some(tokio::spawn(fut)),
        }
    }

    /// Cancels the timer. Cancelling twice is a no-op.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// True once the timer ran to completion or was cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Current wall-clock time in milliseconds since Unix epoch.
pub fn wall_clock_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Scheduler backed by tokio's timer.
///
/// `now_ms` is anchored to the wall clock at construction and then advances
/// with tokio's monotonic clock, so paused-time tests see time move only when
/// the runtime advances it.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    origin: tokio::time::Instant,
    origin_ms: u64,
}

impl TokioScheduler {
    pub fn new() -> Self {
        TokioScheduler {
            origin: tokio::time::Instant::now(),
            origin_ms: wall_clock_ms(),
        }
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TokioScheduler {
    fn now_ms(&self) -> u64 {
        self.origin_ms + self.origin.elapsed().as_millis() as u64
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
