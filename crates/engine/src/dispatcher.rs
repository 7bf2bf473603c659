// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stage chaining and cold-start requeue.
//!
//! The dispatcher owns the per-stage queues and the rule that stitches
//! stages together: when stage K completes a job, stage K+1 gets it.
//! The same rule, applied to a filesystem scan, reconstructs all
//! pending work after a restart.

use crate::error::EngineError;
use crate::queue::JobQueue;
use sf_core::{Clock, JobId, Pipeline, StageName};
use sf_storage::{MetadataStore, StageStatus, StoreError};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct Dispatcher<C: Clock> {
    pipeline: Pipeline,
    queue: Arc<dyn JobQueue>,
    store: Arc<MetadataStore<C>>,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(pipeline: Pipeline, queue: Arc<dyn JobQueue>, store: Arc<MetadataStore<C>>) -> Self {
        Self {
            pipeline,
            queue,
            store,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Request that `stage` eventually process `job`.
    pub fn enqueue(&self, stage: &StageName, job: &JobId) -> Result<bool, EngineError> {
        if self.pipeline.get(stage).is_none() {
            return Err(EngineError::UnknownStage(stage.clone()));
        }
        Ok(self.queue.enqueue(stage, job.clone()))
    }

    /// Enqueue a job on the first stage.
    pub fn enqueue_first(&self, job: &JobId) -> Result<bool, EngineError> {
        let first = self.pipeline.first().name.clone();
        self.enqueue(&first, job)
    }

    /// Hook fired after a stage completes. Best-effort: a failure to
    /// auto-enqueue is logged but never un-completes the job; cold
    /// start picks the job up again.
    pub fn on_completed(&self, stage: &StageName, job: &JobId) {
        match self.pipeline.next_after(stage) {
            Some(next) => {
                let queued = self.queue.enqueue(&next.name, job.clone());
                if !queued {
                    warn!(%job, stage = %next.name, "auto-enqueue for next stage did not take");
                }
                if let Err(e) = self
                    .store
                    .append_log(job, &format!("queued for stage {}", next.name))
                {
                    warn!(%job, error = %e, "failed to log stage chaining");
                }
            }
            None => {
                if let Err(e) = self.store.append_log(job, "pipeline complete") {
                    warn!(%job, error = %e, "failed to log pipeline completion");
                }
                debug!(%job, "final stage complete");
            }
        }
    }

    /// Hook fired after a stage fails. No automatic downstream effect;
    /// a retry re-enters the pipeline at stage 1.
    pub fn on_failed(&self, stage: &StageName, job: &JobId, error: &str) {
        warn!(%job, %stage, error, "stage failed");
        if let Err(e) = self
            .store
            .append_log(job, &format!("stage {} failed: {}", stage, error))
        {
            warn!(%job, error = %e, "failed to log stage failure");
        }
    }

    /// Reconstruct pending work from filesystem truth.
    ///
    /// Every job in `NEW` goes to stage 1. Every job in `DONE` whose
    /// records show stage K complete and stage K+1 not started goes to
    /// stage K+1. Jobs in `CLAIMED`/`RUNNING` are left to the reclaimer.
    pub fn requeue_from_disk(&self) -> Result<usize, EngineError> {
        let mut count = 0;

        for id in self.store.list_by_state(sf_core::JobState::New)? {
            if self.enqueue_first(&id)? {
                count += 1;
            }
        }

        for id in self.store.list_by_state(sf_core::JobState::Done)? {
            let meta = match self.store.read_metadata(&id) {
                Ok(meta) => meta,
                Err(StoreError::Corrupt { .. }) => {
                    warn!(%id, "quarantined job skipped during cold start");
                    continue;
                }
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            };
            if let Some(stage) = self.next_unstarted_stage(&meta) {
                if self.enqueue(&stage, &id)? {
                    count += 1;
                }
            }
        }

        if count > 0 {
            info!(count, "requeued jobs from filesystem state");
        }
        Ok(count)
    }

    /// First stage this job still has to run, walking pipeline order.
    /// `None` when every stage is complete or an earlier stage is in a
    /// state only retry can fix.
    fn next_unstarted_stage(&self, meta: &sf_storage::JobMetadata) -> Option<StageName> {
        for stage in self.pipeline.stages() {
            match meta.stage_status(&stage.name) {
                StageStatus::Complete => continue,
                StageStatus::NotStarted => return Some(stage.name.clone()),
                StageStatus::Failed => {
                    warn!(job = %meta.id, stage = %stage.name, "job parked with a failed stage record");
                    return None;
                }
            }
        }
        None
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
