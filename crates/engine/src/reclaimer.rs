// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic lease reclaim.
//!
//! Scans `CLAIMED/` and `RUNNING/` and returns lease-expired jobs to
//! `NEW`, then hands them back to stage 1 so the pipeline fast-forwards
//! them to wherever their stage records say they left off. A valid
//! lease makes the whole sweep a no-op for that job.

use crate::dispatcher::Dispatcher;
use sf_core::{Clock, JobState};
use sf_storage::{JobMover, MetadataStore, ReclaimOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Reclaimer<C: Clock> {
    store: Arc<MetadataStore<C>>,
    mover: Arc<JobMover<C>>,
    dispatcher: Arc<Dispatcher<C>>,
    interval: Duration,
}

impl<C: Clock> Reclaimer<C> {
    pub fn new(
        store: Arc<MetadataStore<C>>,
        mover: Arc<JobMover<C>>,
        dispatcher: Arc<Dispatcher<C>>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            mover,
            dispatcher,
            interval,
        }
    }

    /// One pass over the leasable state directories. Returns how many
    /// jobs were reclaimed.
    pub fn sweep(&self) -> usize {
        let mut reclaimed = 0;
        for state in [JobState::Claimed, JobState::Running] {
            let ids = match self.store.list_by_state(state) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(%state, error = %e, "reclaim scan failed");
                    continue;
                }
            };
            for id in ids {
                match self.mover.reclaim(&id) {
                    Ok(ReclaimOutcome::Reclaimed) => {
                        reclaimed += 1;
                        // Back through the pipeline; completed stages
                        // fast-forward off their stage records.
                        if let Err(e) = self.dispatcher.enqueue_first(&id) {
                            warn!(%id, error = %e, "failed to requeue reclaimed job");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => warn!(%id, error = %e, "reclaim failed"),
                }
            }
        }
        reclaimed
    }

    /// Run sweeps on the configured cadence until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // Consume the interval's immediate first tick; sweeps start one
        // full interval after boot.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let n = self.sweep();
                    if n > 0 {
                        info!(reclaimed = n, "lease reclaim sweep");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "reclaimer_tests.rs"]
mod tests;
