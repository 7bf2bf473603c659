// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S1: happy path through a single stage, driven entirely through the
//! facade (no background workers).

use crate::prelude::*;
use serde_json::json;
use sf_core::{Actor, JobState};

#[tokio::test]
async fn single_stage_manual_drive() {
    let spec = spec_env(&["download"]);
    let worker = Actor::Worker(stage("download"));

    let id = spec.orch.create_job(json!({"ref": "demo"})).unwrap();
    assert_eq!(spec.state_of(&id), JobState::New);

    spec.orch
        .transition_job(&id, JobState::Claimed, &Actor::System)
        .unwrap();
    spec.orch
        .transition_job(&id, JobState::Running, &worker)
        .unwrap();

    spec.store
        .write_artifact(&id, &stage("download"), "audio.out", b"pcm data")
        .unwrap();

    spec.orch
        .transition_job(&id, JobState::Done, &worker)
        .unwrap();

    let meta = spec.orch.get_job(&id).unwrap();
    assert_eq!(meta.state, JobState::Done);

    let artifacts = spec.orch.get_job_artifacts(&id).unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts["download"], vec!["audio.out"]);

    let log = spec.orch.get_job_log(&id).unwrap();
    assert!(log[0].ends_with("] created"));
    assert!(log
        .iter()
        .any(|l| l.ends_with("Transitioned to DONE by worker:download")));
}
