// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S2, S3, S8: illegal transitions, unauthorized actors, and the
//! concurrent-claim race.

use crate::prelude::*;
use serde_json::json;
use sf_core::{Actor, JobState, TransitionError};
use sf_engine::EngineError;
use sf_storage::MoveError;

#[tokio::test]
async fn illegal_transition_is_rejected_and_mutates_nothing() {
    let spec = spec_env(&["download"]);
    let id = spec.orch.create_job(json!({})).unwrap();
    let log_before = spec.orch.get_job_log(&id).unwrap();

    let err = spec
        .orch
        .transition_job(&id, JobState::Running, &Actor::System)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Move(MoveError::Transition(
            TransitionError::UnknownTransition { .. }
        ))
    ));

    assert_eq!(spec.state_of(&id), JobState::New);
    assert_eq!(spec.dirs_containing(&id), 1);
    assert_eq!(spec.orch.get_job_log(&id).unwrap(), log_before);
}

#[tokio::test]
async fn unauthorized_actor_is_rejected_and_mutates_nothing() {
    let spec = spec_env(&["download"]);
    let id = spec.orch.create_job(json!({})).unwrap();
    spec.orch
        .transition_job(&id, JobState::Claimed, &Actor::System)
        .unwrap();

    // CLAIMED -> RUNNING is a legal pair, but only for a stage worker
    let err = spec
        .orch
        .transition_job(&id, JobState::Running, &Actor::System)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Move(MoveError::Transition(
            TransitionError::UnauthorizedActor { .. }
        ))
    ));
    assert_eq!(spec.state_of(&id), JobState::Claimed);
}

#[tokio::test]
async fn concurrent_claims_serialize_on_the_rename() {
    let spec = spec_env(&["download"]);
    let id = spec.orch.create_job(json!({})).unwrap();

    let results: Vec<Result<(), EngineError>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let orch = std::sync::Arc::clone(&spec.orch);
                let id = id.clone();
                scope.spawn(move || orch.transition_job(&id, JobState::Claimed, &Actor::System))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one claim wins");
    for result in &results {
        if let Err(e) = result {
            assert!(
                matches!(
                    e,
                    EngineError::Move(MoveError::NotFoundInState { .. })
                        | EngineError::Move(MoveError::AlreadyExistsInTarget { .. })
                        | EngineError::Store(sf_storage::StoreError::NotFound(_))
                ),
                "loser fails deterministically, got: {e}"
            );
        }
    }

    assert_eq!(spec.state_of(&id), JobState::Claimed);
    assert_eq!(spec.dirs_containing(&id), 1, "job exists exactly once");
}
