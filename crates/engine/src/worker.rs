// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The generic stage worker skeleton.
//!
//! Every concrete stage runs inside this loop: pull a job reference,
//! claim it through the mover, run the processor with lease renewal and
//! a timeout, then record the result and hand the job back to the
//! dispatcher. The skeleton is what makes re-delivery harmless: a job
//! that is already past this stage is skipped, and work a crashed
//! worker finished is detected and fast-forwarded instead of redone.

use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::queue::JobQueue;
use serde_json::json;
use sf_adapters::{StageProcessor, StageRequest, StageSuccess};
use sf_core::{Actor, Clock, JobId, JobState, Pipeline, StageDef, StageName};
use sf_storage::{JobMover, MetadataStore, MoveError, StageRecord, StageStatus, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared collaborators for all stage workers.
pub(crate) struct StageDeps<C: Clock> {
    pub pipeline: Pipeline,
    pub store: Arc<MetadataStore<C>>,
    pub mover: Arc<JobMover<C>>,
    pub dispatcher: Arc<Dispatcher<C>>,
    pub queue: Arc<dyn JobQueue>,
    pub processors: HashMap<StageName, Arc<dyn StageProcessor>>,
}

/// One task pool per stage, each bounded by the stage's concurrency.
pub struct WorkerPool<C: Clock> {
    deps: Arc<StageDeps<C>>,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
}

impl<C: Clock> WorkerPool<C> {
    pub(crate) fn new(deps: Arc<StageDeps<C>>, cancel: CancellationToken) -> Self {
        Self {
            deps,
            cancel,
            tasks: JoinSet::new(),
        }
    }

    /// Spawn every stage's workers. Fails fast when a stage has no
    /// processor wired.
    pub fn spawn_all(&mut self) -> Result<(), EngineError> {
        let stages: Vec<StageDef> = self.deps.pipeline.stages().to_vec();
        for stage in stages {
            let processor = self
                .deps
                .processors
                .get(&stage.name)
                .cloned()
                .ok_or_else(|| EngineError::MissingProcessor(stage.name.clone()))?;
            for slot in 0..stage.concurrency {
                let deps = Arc::clone(&self.deps);
                let processor = Arc::clone(&processor);
                let stage = stage.clone();
                let cancel = self.cancel.clone();
                self.tasks
                    .spawn(worker_loop(deps, stage, processor, slot, cancel));
            }
        }
        Ok(())
    }

    /// Wait for all workers to finish (after cancellation/shutdown).
    pub async fn join(mut self) {
        while self.tasks.join_next().await.is_some() {}
    }
}

async fn worker_loop<C: Clock>(
    deps: Arc<StageDeps<C>>,
    stage: StageDef,
    processor: Arc<dyn StageProcessor>,
    slot: u32,
    cancel: CancellationToken,
) {
    let worker_id = format!("{}#{}", stage.name, slot);
    loop {
        let job = tokio::select! {
            _ = cancel.cancelled() => break,
            job = deps.queue.recv(&stage.name) => job,
        };
        let Some(id) = job else { break };
        if let Err(e) = process_job(&deps, &stage, &processor, &worker_id, &id, &cancel).await {
            warn!(worker = %worker_id, job = %id, error = %e, "stage processing errored");
        }
    }
    debug!(worker = %worker_id, "worker stopped");
}

/// Run one job through one stage: gate, claim, lease, execute, record.
pub(crate) async fn process_job<C: Clock>(
    deps: &StageDeps<C>,
    stage: &StageDef,
    processor: &Arc<dyn StageProcessor>,
    worker_id: &str,
    id: &JobId,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    let actor = Actor::Worker(stage.name.clone());

    let meta = match deps.store.read_metadata(id) {
        Ok(meta) => meta,
        Err(StoreError::NotFound(_)) => {
            debug!(job = %id, "job vanished before processing; dropping");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    // Prerequisite gate: the previous stage must be COMPLETE. A stale
    // or early delivery is requeued after a backoff rather than failed.
    if let Some(prev) = deps.pipeline.prerequisite(&stage.name) {
        if meta.stage_status(&prev.name) != StageStatus::Complete {
            debug!(job = %id, stage = %stage.name, "prerequisite stage not complete; requeueing");
            tokio::time::sleep(stage.backoff).await;
            let _ = deps.dispatcher.enqueue(&stage.name, id);
            return Ok(());
        }
    }

    let already_complete = meta.stage_status(&stage.name) == StageStatus::Complete;

    // Claim. Stage 1 claims out of NEW; later stages claim out of DONE,
    // where the previous stage parked the job. Everything else is a
    // duplicate or stale delivery and is skipped cleanly.
    let claim_from = match meta.state {
        JobState::New if deps.pipeline.is_first(&stage.name) => JobState::New,
        JobState::Done if !already_complete => JobState::Done,
        _ => {
            debug!(job = %id, state = %meta.state, stage = %stage.name, "nothing to do; skipping");
            return Ok(());
        }
    };
    match deps.mover.move_job(id, claim_from, JobState::Claimed, &actor) {
        Ok(()) => {}
        Err(MoveError::NotFoundInState { .. }) | Err(MoveError::AlreadyExistsInTarget { .. }) => {
            debug!(job = %id, "lost the claim race; skipping");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    // Stamp the lease while the job is CLAIMED.
    let mut meta = deps.store.read_metadata(id)?;
    let lease_ms = stage.lease.as_millis() as u64;
    meta.grant_lease(worker_id, deps.store.now_ms() + lease_ms);
    deps.store.write_metadata(&mut meta)?;

    match deps
        .mover
        .move_job(id, JobState::Claimed, JobState::Running, &actor)
    {
        Ok(()) => {}
        Err(MoveError::NotFoundInState { .. }) | Err(MoveError::AlreadyExistsInTarget { .. }) => {
            debug!(job = %id, "job reclaimed between claim and start; skipping");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    // Crash recovery / retry fast-forward: the work is already recorded
    // as done, so advance the directory state without redoing it.
    if already_complete {
        deps.mover
            .move_job(id, JobState::Running, JobState::Done, &actor)?;
        deps.dispatcher.on_completed(&stage.name, id);
        return Ok(());
    }

    match run_with_retries(deps, stage, processor, worker_id, id, &meta, cancel).await {
        RunResult::Success(success) => {
            let written = write_artifacts(deps, id, &stage.name, success.artifacts)?;
            let mut record = StageRecord::complete(deps.store.now_ms());
            record.provider = success.provider;
            record.extra = success.extra;
            if !written.is_empty() {
                record.extra.insert("artifacts".to_string(), json!(written));
            }
            let mut meta = deps.store.read_metadata(id)?;
            meta.set_stage_record(&stage.name, record)?;
            deps.store.write_metadata(&mut meta)?;
            deps.mover
                .move_job(id, JobState::Running, JobState::Done, &actor)?;
            deps.dispatcher.on_completed(&stage.name, id);
        }
        RunResult::Failure { reason, message } => {
            let mut meta = deps.store.read_metadata(id)?;
            meta.set_stage_record(
                &stage.name,
                StageRecord::failed(&reason, &message, deps.store.now_ms()),
            )?;
            deps.store.write_metadata(&mut meta)?;
            deps.store
                .append_log(id, &format!("[{}] ERROR: {}: {}", stage.name, reason, message))?;
            deps.mover
                .move_job(id, JobState::Running, JobState::Failed, &actor)?;
            deps.dispatcher.on_failed(&stage.name, id, &message);
        }
        RunResult::TimedOut => {
            // Deliberately left RUNNING: the reclaimer returns the job
            // to NEW once the (no longer renewed) lease expires.
            let _ = deps.store.append_log(
                id,
                &format!(
                    "[{}] timed out after {}s; awaiting lease reclaim",
                    stage.name,
                    stage.timeout.as_secs()
                ),
            );
            warn!(job = %id, stage = %stage.name, "stage timed out; job left RUNNING for reclaim");
        }
        RunResult::Cancelled => {
            debug!(job = %id, stage = %stage.name, "shutdown during stage work; job left RUNNING");
        }
    }
    Ok(())
}

enum RunResult {
    Success(StageSuccess),
    Failure { reason: String, message: String },
    TimedOut,
    Cancelled,
}

/// Drive the processor with a timeout, periodic lease renewal, and the
/// stage's transient-error retry budget.
async fn run_with_retries<C: Clock>(
    deps: &StageDeps<C>,
    stage: &StageDef,
    processor: &Arc<dyn StageProcessor>,
    worker_id: &str,
    id: &JobId,
    meta: &sf_storage::JobMetadata,
    cancel: &CancellationToken,
) -> RunResult {
    let renew_every = (stage.lease / 2).max(std::time::Duration::from_millis(500));
    let mut attempt: u32 = 0;

    'attempts: loop {
        attempt += 1;
        let workdir = deps
            .store
            .layout()
            .scratch_dir()
            .join(format!("{}-{}", id, stage.name));
        // Leftovers from a crashed attempt are stale; start clean.
        let _ = std::fs::remove_dir_all(&workdir);
        if let Err(e) = std::fs::create_dir_all(&workdir) {
            return RunResult::Failure {
                reason: "io".to_string(),
                message: format!("scratch dir: {}", e),
            };
        }

        let request = StageRequest {
            job_id: id,
            stage: &stage.name,
            metadata: meta,
            workdir: &workdir,
        };
        let run = tokio::time::timeout(stage.timeout, processor.run(request));
        tokio::pin!(run);
        let mut renew = tokio::time::interval(renew_every);
        renew.tick().await; // the immediate first tick

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => return RunResult::Cancelled,
                _ = renew.tick() => renew_lease(deps, stage, worker_id, id),
                result = &mut run => break result,
            }
        };
        let _ = std::fs::remove_dir_all(&workdir);

        match result {
            Err(_elapsed) => return RunResult::TimedOut,
            Ok(Ok(sf_adapters::StageOutcome::Success(success))) => {
                return RunResult::Success(success)
            }
            Ok(Ok(sf_adapters::StageOutcome::Failure { reason, message })) => {
                return RunResult::Failure { reason, message }
            }
            Ok(Err(io_err)) => {
                if attempt <= stage.retries {
                    warn!(
                        job = %id,
                        stage = %stage.name,
                        attempt,
                        error = %io_err,
                        "transient stage failure; retrying"
                    );
                    let _ = deps.store.append_log(
                        id,
                        &format!("[{}] transient failure (attempt {}): {}", stage.name, attempt, io_err),
                    );
                    tokio::time::sleep(stage.backoff * attempt).await;
                    continue 'attempts;
                }
                return RunResult::Failure {
                    reason: "io".to_string(),
                    message: io_err.to_string(),
                };
            }
        }
    }
}

/// Metadata-only lease extension; never a state transition.
fn renew_lease<C: Clock>(deps: &StageDeps<C>, stage: &StageDef, worker_id: &str, id: &JobId) {
    let extend = || -> Result<(), EngineError> {
        let mut meta = deps.store.read_metadata(id)?;
        let lease_ms = stage.lease.as_millis() as u64;
        meta.grant_lease(worker_id, deps.store.now_ms() + lease_ms);
        deps.store.write_metadata(&mut meta)?;
        Ok(())
    };
    if let Err(e) = extend() {
        warn!(job = %id, worker = %worker_id, error = %e, "lease renewal failed");
    }
}

/// Write stage outputs, choosing a fresh suffixed name on collision:
/// artifacts are immutable, so a re-execution never rewrites them.
fn write_artifacts<C: Clock>(
    deps: &StageDeps<C>,
    id: &JobId,
    stage: &StageName,
    artifacts: Vec<sf_adapters::Artifact>,
) -> Result<Vec<String>, EngineError> {
    let mut written = Vec::new();
    for artifact in artifacts {
        let mut name = artifact.name.clone();
        let mut round = 0u32;
        loop {
            match deps.store.write_artifact(id, stage, &name, &artifact.bytes) {
                Ok(_) => {
                    written.push(name);
                    break;
                }
                Err(StoreError::ArtifactExists { .. }) if round < 64 => {
                    round += 1;
                    name = suffixed_name(&artifact.name, round);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(written)
}

fn suffixed_name(name: &str, round: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-r{}.{}", stem, round, ext),
        _ => format!("{}-r{}", name, round),
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
