// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Facade operations for an external interface.
//!
//! The semantic surface an HTTP/RPC layer (out of scope here) would
//! adapt: create, list, inspect, retry, and transition jobs. Every
//! operation reads filesystem truth; the derived index is only kept
//! fresh best-effort on the side.

use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use serde_json::Value;
use sf_core::{Actor, Clock, IdGen, JobId, JobState, Pipeline};
use sf_storage::{JobIndex, JobMetadata, JobMover, MetadataStore, StageStatus, StoreError};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Listing filter: optional state, pagination.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub state: Option<JobState>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// One row of a job listing.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub id: JobId,
    pub state: JobState,
    pub created_at: u64,
    pub updated_at: u64,
    /// False when the metadata record is quarantined (unparseable).
    pub readable: bool,
}

/// The facade over the core.
pub struct Orchestrator<C: Clock, G: IdGen> {
    store: Arc<MetadataStore<C>>,
    mover: Arc<JobMover<C>>,
    dispatcher: Arc<Dispatcher<C>>,
    index: Arc<JobIndex>,
    pipeline: Pipeline,
    idgen: G,
}

impl<C: Clock, G: IdGen> Orchestrator<C, G> {
    pub fn new(
        store: Arc<MetadataStore<C>>,
        mover: Arc<JobMover<C>>,
        dispatcher: Arc<Dispatcher<C>>,
        index: Arc<JobIndex>,
        pipeline: Pipeline,
        idgen: G,
    ) -> Self {
        Self {
            store,
            mover,
            dispatcher,
            index,
            pipeline,
            idgen,
        }
    }

    /// Create a job in `NEW` and hand it to stage 1.
    pub fn create_job(&self, input: Value) -> Result<JobId, EngineError> {
        let id = JobId::parse(self.idgen.next())?;
        let meta = JobMetadata::new(id.clone(), input, self.store.now_ms());
        self.store.create_job(&meta)?;
        self.store.append_log(&id, "created")?;
        self.index.note(&meta);
        self.dispatcher.enqueue_first(&id)?;
        info!(job = %id, "job created");
        Ok(id)
    }

    /// Enumerate jobs from the filesystem, newest first.
    pub fn list_jobs(&self, filter: &ListFilter) -> Result<Vec<JobSummary>, EngineError> {
        let entries = self.store.enumerate()?;
        let summaries = entries
            .into_iter()
            .filter(|e| filter.state.map(|s| e.state == s).unwrap_or(true))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .map(|e| {
                let (created_at, updated_at) = e
                    .metadata
                    .as_ref()
                    .map(|m| (m.created_at, m.updated_at))
                    .unwrap_or((0, 0));
                JobSummary {
                    readable: e.metadata.is_some(),
                    id: e.id,
                    state: e.state,
                    created_at,
                    updated_at,
                }
            })
            .collect();
        Ok(summaries)
    }

    pub fn get_job(&self, id: &JobId) -> Result<JobMetadata, EngineError> {
        Ok(self.store.read_metadata(id)?)
    }

    pub fn get_job_log(&self, id: &JobId) -> Result<Vec<String>, EngineError> {
        Ok(self.store.read_log(id)?)
    }

    pub fn get_job_artifacts(
        &self,
        id: &JobId,
    ) -> Result<BTreeMap<String, Vec<String>>, EngineError> {
        Ok(self.store.list_artifacts(id)?)
    }

    /// Retry a failed job: clear the failed stage records, log the
    /// caller's reason, and send the job back through stage 1. Stages
    /// whose records are still COMPLETE fast-forward.
    pub fn retry_job(&self, id: &JobId, reason: &str) -> Result<(), EngineError> {
        let mut meta = self.store.read_metadata(id)?;
        if meta.state != JobState::Failed {
            return Err(EngineError::RetryNotFailed {
                id: id.clone(),
                state: meta.state,
            });
        }
        for stage in self.pipeline.stages() {
            if meta.stage_status(&stage.name) == StageStatus::Failed {
                meta.clear_stage_record(&stage.name);
            }
        }
        self.store.write_metadata(&mut meta)?;
        self.store.append_log(id, reason)?;
        self.mover
            .move_job(id, JobState::Failed, JobState::New, &Actor::User)?;
        self.dispatcher.enqueue_first(id)?;
        info!(job = %id, reason, "job retried");
        Ok(())
    }

    /// The mover, exposed for integrations: transition the job from
    /// wherever it currently is to `to`, as `actor`.
    pub fn transition_job(
        &self,
        id: &JobId,
        to: JobState,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        let (from, _) = self.store.locate(id)?;
        // A job already sitting in the target is the "residue" case for
        // a caller that lost a race; surface it the way the mover does.
        if from == to {
            return Err(EngineError::Move(sf_storage::MoveError::AlreadyExistsInTarget {
                id: id.clone(),
                state: to,
            }));
        }
        Ok(self.mover.move_job(id, from, to, actor)?)
    }

    /// Land opaque uploaded bytes in the uploads area under a unique
    /// name, returning the path for use in an ingest descriptor.
    pub fn stash_upload(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf, EngineError> {
        let layout = self.store.layout();
        std::fs::create_dir_all(layout.uploads_dir())?;
        loop {
            let token = self.idgen.next();
            let path = layout.upload_path(&token, original_name);
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    use std::io::Write;
                    file.write_all(bytes)?;
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// `NotFound` as a cheap existence probe for facades.
    pub fn job_exists(&self, id: &JobId) -> bool {
        self.store.locate(id).is_ok()
    }
}

// StoreError is the facade's NotFound channel; keep the conversion in
// one place so callers can match on it.
impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            EngineError::Store(StoreError::NotFound(_))
                | EngineError::Move(sf_storage::MoveError::NotFoundInState { .. })
        )
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
