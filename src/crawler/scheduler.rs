//! Bounded-concurrency task runner
//!
//! This module handles:
//! - A FIFO of pending jobs dispatched onto the tokio runtime
//! - A concurrency limit that can be changed while jobs are in flight
//! - Start/pause switching that never cancels running jobs
//! - Idle detection (no pending and no in-flight jobs)
//! - Panic isolation: a panicking job is logged and counted, never propagated

use futures::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{error, trace};

/// A unit of work
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Point-in-time view of the scheduler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub pending: usize,
    pub in_flight: usize,
    pub concurrency: usize,
    pub running: bool,
    /// Jobs that panicked since the scheduler was created
    pub panicked: u64,
}

struct QueueState {
    pending: VecDeque<Job>,
    in_flight: usize,
    concurrency: usize,
    running: bool,
    panicked: u64,
}

struct Inner {
    state: Mutex<QueueState>,
    idle: Notify,
}

/// Scheduler dispatching jobs at bounded concurrency
///
/// Created paused; nothing runs until [`Scheduler::start`].
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a paused scheduler with the given concurrency limit (at least 1)
    pub fn new(concurrency: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    in_flight: 0,
                    concurrency: concurrency.max(1),
                    running: false,
                    panicked: 0,
                }),
                idle: Notify::new(),
            }),
        }
    }

    fn lock(inner: &Inner) -> MutexGuard<'_, QueueState> {
        inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues a job; it runs as soon as a slot is free and the scheduler is running
    pub fn add<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::lock(&self.inner).pending.push_back(Box::pin(job));
        Self::pump(&self.inner);
    }

    pub fn start(&self) {
        Self::lock(&self.inner).running = true;
        Self::pump(&self.inner);
    }

    /// Stops dispatching; in-flight jobs run to completion
    pub fn pause(&self) {
        Self::lock(&self.inner).running = false;
    }

    /// Changes the concurrency limit; takes effect on the next dispatch
    pub fn set_concurrency(&self, concurrency: usize) {
        Self::lock(&self.inner).concurrency = concurrency.max(1);
        Self::pump(&self.inner);
    }

    pub fn concurrency(&self) -> usize {
        Self::lock(&self.inner).concurrency
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = Self::lock(&self.inner);
        SchedulerStats {
            pending: state.pending.len(),
            in_flight: state.in_flight,
            concurrency: state.concurrency,
            running: state.running,
            panicked: state.panicked,
        }
    }

    pub fn is_idle(&self) -> bool {
        let state = Self::lock(&self.inner);
        state.pending.is_empty() && state.in_flight == 0
    }

    /// Resolves once there are no pending and no in-flight jobs
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Dispatches pending jobs while slots are free
    fn pump(inner: &Arc<Inner>) {
        let mut state = Self::lock(inner);
        while state.running && state.in_flight < state.concurrency {
            let Some(job) = state.pending.pop_front() else {
                break;
            };
            state.in_flight += 1;
            trace!(
                "Dispatching job ({} in flight, {} pending)",
                state.in_flight,
                state.pending.len()
            );

            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let panicked = AssertUnwindSafe(job).catch_unwind().await.is_err();
                Self::finish(&inner, panicked);
            });
        }
    }

    fn finish(inner: &Arc<Inner>, panicked: bool) {
        let idle = {
            let mut state = Self::lock(inner);
            state.in_flight -= 1;
            if panicked {
                state.panicked += 1;
                error!("Task panicked; continuing with the rest of the queue");
            }
            state.pending.is_empty() && state.in_flight == 0
        };

        if idle {
            inner.idle.notify_waiters();
        } else {
            Self::pump(inner);
        }
    }
}
