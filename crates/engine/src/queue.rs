// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-stage work queues.
//!
//! The queue is deliberately a small seam: correctness never depends on
//! queue durability, because the filesystem state is sufficient to
//! reconstruct all pending work (see the dispatcher's cold-start rule).
//! The in-memory implementation is the default; a persistent or
//! broker-backed transport only has to honor the same contract.

use async_trait::async_trait;
use parking_lot::Mutex;
use sf_core::{JobId, Pipeline, StageName};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;
use tracing::warn;

/// The queue contract the dispatcher and workers rely on.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    /// Request that `stage` eventually process `job`. Idempotent per
    /// job within a stage: returns false when the job is already
    /// pending there (or the stage is unknown / the queue is closed).
    fn enqueue(&self, stage: &StageName, job: JobId) -> bool;

    /// Next job for `stage`. Returns `None` once the queue is shut
    /// down; pending items are intentionally not drained, because a
    /// restart re-derives them from the filesystem.
    async fn recv(&self, stage: &StageName) -> Option<JobId>;

    /// Stop handing out work. Wakes every waiting worker.
    fn shutdown(&self);
}

#[derive(Default)]
struct StageChannel {
    queue: Mutex<ChannelState>,
    notify: Notify,
}

#[derive(Default)]
struct ChannelState {
    order: VecDeque<JobId>,
    pending: HashSet<JobId>,
}

/// Tokio-backed in-memory queue, one channel per pipeline stage.
pub struct InMemoryQueue {
    channels: HashMap<StageName, StageChannel>,
    closed: AtomicBool,
}

impl InMemoryQueue {
    pub fn new(pipeline: &Pipeline) -> Self {
        let channels = pipeline
            .stages()
            .iter()
            .map(|s| (s.name.clone(), StageChannel::default()))
            .collect();
        Self {
            channels,
            closed: AtomicBool::new(false),
        }
    }

    /// Jobs currently pending for a stage (test/introspection aid).
    pub fn pending(&self, stage: &StageName) -> Vec<JobId> {
        self.channels
            .get(stage)
            .map(|c| c.queue.lock().order.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobQueue for InMemoryQueue {
    fn enqueue(&self, stage: &StageName, job: JobId) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let Some(channel) = self.channels.get(stage) else {
            warn!(%stage, %job, "enqueue for unknown stage dropped");
            return false;
        };
        {
            let mut state = channel.queue.lock();
            if !state.pending.insert(job.clone()) {
                return false;
            }
            state.order.push_back(job);
        }
        channel.notify.notify_one();
        true
    }

    async fn recv(&self, stage: &StageName) -> Option<JobId> {
        let channel = self.channels.get(stage)?;
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            {
                let mut state = channel.queue.lock();
                if let Some(job) = state.order.pop_front() {
                    state.pending.remove(&job);
                    return Some(job);
                }
            }
            channel.notify.notified().await;
        }
    }

    fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for channel in self.channels.values() {
            channel.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
