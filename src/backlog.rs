//! Bounded backlog of pending detection jobs.
//!
//! A stale event's detection result is worthless, so the backlog drops the
//! oldest job on overflow and serves the newest job first.

use alloy::primitives::Address;
use std::collections::VecDeque;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use crate::graph::EventRef;

/// One scheduled detection pass: the triggering event and its seed set.
#[derive(Debug, Clone)]
pub struct DetectionJob {
    pub event: EventRef,
    pub seeds: Vec<Address>,
}

#[derive(Clone, Copy, Debug)]
pub struct PushOutcome {
    pub dropped_oldest: bool,
}

pub struct Backlog {
    capacity: usize,
    queue: Mutex<VecDeque<DetectionJob>>,
    notify: Notify,
}

impl Backlog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, job: DetectionJob) -> PushOutcome {
        let mut queue = self.queue.lock().await;
        let dropped_oldest = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(job);
        drop(queue);
        self.notify.notify_one();
        PushOutcome { dropped_oldest }
    }

    /// Newest job first; blocks until a job arrives or the worker shuts
    /// down.
    pub async fn pop_latest(&self, shutdown: &CancellationToken) -> Option<DetectionJob> {
        loop {
            let notified = self.notify.notified();
            {
                let mut queue = self.queue.lock().await;
                if let Some(job) = queue.pop_back() {
                    return Some(job);
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = notified => {}
            }
        }
    }
}
