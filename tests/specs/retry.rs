// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S4: the retry flow.

use crate::prelude::*;
use serde_json::json;
use sf_core::{Actor, JobState};
use sf_engine::EngineError;
use sf_storage::{StageRecord, StageStatus};

fn drive_to_failed(spec: &Spec) -> sf_core::JobId {
    let id = spec.orch.create_job(json!({"ref": "demo"})).unwrap();
    let worker = Actor::Worker(stage("download"));
    spec.orch
        .transition_job(&id, JobState::Claimed, &Actor::System)
        .unwrap();
    spec.orch
        .transition_job(&id, JobState::Running, &worker)
        .unwrap();
    let mut meta = spec.store.read_metadata(&id).unwrap();
    meta.set_stage_record(
        &stage("download"),
        StageRecord::failed("X", "download exploded", spec.store.now_ms()),
    )
    .unwrap();
    spec.store.write_metadata(&mut meta).unwrap();
    spec.orch
        .transition_job(&id, JobState::Failed, &worker)
        .unwrap();
    id
}

#[tokio::test]
async fn retry_moves_failed_job_back_to_new() {
    let spec = spec_env(&["download"]);
    let id = drive_to_failed(&spec);
    assert_eq!(spec.state_of(&id), JobState::Failed);

    spec.orch.retry_job(&id, "user retry").unwrap();

    assert_eq!(spec.state_of(&id), JobState::New);
    let meta = spec.orch.get_job(&id).unwrap();
    assert_eq!(
        meta.stage_status(&stage("download")),
        StageStatus::NotStarted,
        "failed stage record cleared"
    );
    let log = spec.orch.get_job_log(&id).unwrap();
    assert!(log.iter().any(|l| l.ends_with("] user retry")));
}

#[tokio::test]
async fn retry_requires_failed_state() {
    let spec = spec_env(&["download"]);
    let id = drive_to_failed(&spec);
    spec.orch.retry_job(&id, "first retry").unwrap();

    // Job is back in NEW: a second retry must be rejected
    let err = spec.orch.retry_job(&id, "second retry").unwrap_err();
    assert!(matches!(
        err,
        EngineError::RetryNotFailed {
            state: JobState::New,
            ..
        }
    ));

    // And a fresh NEW job cannot be retried either
    let fresh = spec.orch.create_job(json!({})).unwrap();
    assert!(matches!(
        spec.orch.retry_job(&fresh, "nope"),
        Err(EngineError::RetryNotFailed { .. })
    ));
}
