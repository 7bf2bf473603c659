// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job states and the transition authorization table.
//!
//! A job's state is encoded by which state directory holds its folder;
//! this module is the pure half of that contract: which `(from, to)`
//! moves exist at all, and which actor classes may perform them. The
//! mover enforces the table before touching the filesystem.

use crate::actor::{Actor, ActorKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle state of a job within its current stage.
///
/// Serialized (and used as a directory name) with the fixed wire names
/// `NEW`, `CLAIMED`, `RUNNING`, `DONE`, `FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    New,
    Claimed,
    Running,
    Done,
    Failed,
}

impl JobState {
    /// All states, in the order state directories are scanned.
    pub const ALL: [JobState; 5] = [
        JobState::New,
        JobState::Claimed,
        JobState::Running,
        JobState::Done,
        JobState::Failed,
    ];

    /// The exact directory name for this state.
    pub fn dir_name(&self) -> &'static str {
        match self {
            JobState::New => "NEW",
            JobState::Claimed => "CLAIMED",
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        }
    }

    /// Parse a directory name back into a state.
    pub fn from_dir_name(name: &str) -> Option<JobState> {
        JobState::ALL.iter().copied().find(|s| s.dir_name() == name)
    }

    /// True for the states a worker may hold a lease in.
    pub fn is_leasable(&self) -> bool {
        matches!(self, JobState::Claimed | JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Why a requested transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("no transition from {from} to {to}")]
    UnknownTransition { from: JobState, to: JobState },
    #[error("{actor} is not authorized for {from} -> {to}")]
    UnauthorizedActor {
        from: JobState,
        to: JobState,
        actor: Actor,
    },
}

/// Actor classes allowed for each legal `(from, to)` pair.
///
/// Returns `None` when the pair is not a legal transition at all.
pub fn authorized_actors(from: JobState, to: JobState) -> Option<&'static [ActorKind]> {
    use ActorKind::{System, User, Worker};
    use JobState::*;

    match (from, to) {
        (New, Claimed) => Some(&[System, Worker]),
        (Claimed, Running) => Some(&[Worker]),
        (Claimed, New) => Some(&[System]),
        (Running, Done) => Some(&[Worker]),
        (Running, Failed) => Some(&[Worker]),
        (Running, New) => Some(&[System]),
        // Re-entry into the pipeline at the next stage.
        (Done, Claimed) => Some(&[System, Worker]),
        (Failed, New) => Some(&[System, User]),
        _ => None,
    }
}

/// States reachable from `from` by at least one actor.
pub fn valid_next_states(from: JobState) -> Vec<JobState> {
    JobState::ALL
        .iter()
        .copied()
        .filter(|to| authorized_actors(from, *to).is_some())
        .collect()
}

/// Pipeline-relative terminality: `FAILED` always ends the current
/// attempt; `DONE` is terminal only when no further stage remains (for
/// earlier stages the dispatcher re-enters the job at the next one).
pub fn is_terminal(state: JobState, further_stage_remains: bool) -> bool {
    match state {
        JobState::Failed => true,
        JobState::Done => !further_stage_remains,
        _ => false,
    }
}

/// Validate a transition request. Pure; never touches the filesystem.
///
/// Distinguishes a pair that does not exist in the table
/// ([`TransitionError::UnknownTransition`]) from a legal pair requested
/// by the wrong actor class ([`TransitionError::UnauthorizedActor`]).
pub fn validate(from: JobState, to: JobState, actor: &Actor) -> Result<(), TransitionError> {
    let allowed =
        authorized_actors(from, to).ok_or(TransitionError::UnknownTransition { from, to })?;
    if allowed.contains(&actor.kind()) {
        Ok(())
    } else {
        Err(TransitionError::UnauthorizedActor {
            from,
            to,
            actor: actor.clone(),
        })
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
