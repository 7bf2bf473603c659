// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The atomic mover: a state transition IS a cross-directory rename.
//!
//! The rename is the authoritative, serializing step. The existence
//! pre-checks only reject obviously doomed moves early; when two movers
//! race on the same `(job, from)` pair, the filesystem lets exactly one
//! rename succeed and the loser surfaces `NotFoundInState` or
//! `AlreadyExistsInTarget` deterministically.

use crate::index::JobIndex;
use crate::store::{MetadataStore, StoreError};
use sf_core::{state, Actor, Clock, JobId, JobState, TransitionError};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors from move operations.
#[derive(Debug, Error)]
pub enum MoveError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("job {id} not found in {state}")]
    NotFoundInState { id: JobId, state: JobState },
    #[error("job {id} already exists in {state}")]
    AlreadyExistsInTarget { id: JobId, state: JobState },
    #[error("rename between state directories is not atomic here: {0}")]
    NonAtomicFilesystem(String),
    #[error("job {id} is in {found}, expected {expected}")]
    UnexpectedState {
        id: JobId,
        found: JobState,
        expected: JobState,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a reclaim attempt found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimOutcome {
    /// The job was returned to `NEW`.
    Reclaimed,
    /// A worker still holds a valid lease; nothing was touched.
    LeaseHeld,
    /// The job is not in a leasable state; nothing was touched.
    NotEligible,
}

/// Performs validated, logged state transitions.
pub struct JobMover<C: Clock> {
    store: Arc<MetadataStore<C>>,
    index: Option<Arc<JobIndex>>,
}

impl<C: Clock> JobMover<C> {
    pub fn new(store: Arc<MetadataStore<C>>) -> Self {
        Self { store, index: None }
    }

    /// Attach a derived index to update best-effort after each move.
    pub fn with_index(mut self, index: Arc<JobIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Move a job between state directories.
    ///
    /// Validates the transition, renames the folder, rewrites the
    /// metadata record, and appends a transition line to the job log.
    pub fn move_job(
        &self,
        id: &JobId,
        from: JobState,
        to: JobState,
        actor: &Actor,
    ) -> Result<(), MoveError> {
        state::validate(from, to, actor)?;

        let layout = self.store.layout();
        let from_dir = layout.job_dir(from, id);
        if !from_dir.is_dir() {
            return Err(MoveError::NotFoundInState {
                id: id.clone(),
                state: from,
            });
        }
        let to_dir = layout.job_dir(to, id);
        if to_dir.exists() {
            return Err(MoveError::AlreadyExistsInTarget {
                id: id.clone(),
                state: to,
            });
        }

        // A record that cannot be rewritten quarantines the job; refuse
        // the move before touching the filesystem.
        let mut meta = self.store.read_metadata_at(id, &from_dir)?;

        std::fs::create_dir_all(layout.state_dir(to)).map_err(StoreError::Io)?;

        if let Err(e) = std::fs::rename(&from_dir, &to_dir) {
            return Err(classify_rename_error(e, id, from, to));
        }

        meta.state = to;
        if !to.is_leasable() {
            meta.clear_lease();
        }
        meta.touch(self.store.now_ms());
        self.store.write_metadata_at(&to_dir, &meta)?;
        self.store
            .append_log(id, &format!("Transitioned to {} by {}", to, actor))?;
        debug!(job_id = %id, %from, %to, %actor, "job transitioned");

        if let Some(index) = &self.index {
            index.note(&meta);
        }
        Ok(())
    }

    /// Like [`move_job`](Self::move_job), but succeeds without moving
    /// when the job already reached `to`, and fails with
    /// [`MoveError::UnexpectedState`] when it is somewhere else entirely.
    pub fn move_job_idempotent(
        &self,
        id: &JobId,
        expected_from: JobState,
        to: JobState,
        actor: &Actor,
    ) -> Result<(), MoveError> {
        let (found, _) = self.store.locate(id)?;
        if found == to {
            return Ok(());
        }
        if found != expected_from {
            return Err(MoveError::UnexpectedState {
                id: id.clone(),
                found,
                expected: expected_from,
            });
        }
        self.move_job(id, expected_from, to, actor)
    }

    /// Return an abandoned job to `NEW` once its lease has lapsed.
    ///
    /// Safe to run concurrently with worker activity: a valid lease
    /// makes this a no-op, and a worker that races the rename simply
    /// loses the move.
    pub fn reclaim(&self, id: &JobId) -> Result<ReclaimOutcome, MoveError> {
        let (found, dir) = self.store.locate(id)?;
        if !found.is_leasable() {
            return Ok(ReclaimOutcome::NotEligible);
        }
        let meta = self.store.read_metadata_at(id, &dir)?;
        if !meta.lease_expired(self.store.now_ms()) {
            return Ok(ReclaimOutcome::LeaseHeld);
        }
        let owner = meta.owner_id.as_deref().unwrap_or("none").to_string();
        self.move_job(id, found, JobState::New, &Actor::System)?;
        self.store.append_log(
            id,
            &format!("reclaimed from {}: lease expired (owner {})", found, owner),
        )?;
        Ok(ReclaimOutcome::Reclaimed)
    }
}

fn classify_rename_error(e: io::Error, id: &JobId, from: JobState, to: JobState) -> MoveError {
    match e.kind() {
        io::ErrorKind::NotFound => MoveError::NotFoundInState {
            id: id.clone(),
            state: from,
        },
        io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => {
            MoveError::AlreadyExistsInTarget {
                id: id.clone(),
                state: to,
            }
        }
        io::ErrorKind::CrossesDevices => MoveError::NonAtomicFilesystem(e.to_string()),
        _ => MoveError::Store(StoreError::Io(e)),
    }
}

#[cfg(test)]
#[path = "mover_tests.rs"]
mod tests;
