// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S6: multi-stage auto-chaining through the background workers.

use crate::prelude::*;
use serde_json::json;
use sf_storage::StageStatus;

#[tokio::test]
async fn two_stages_chain_automatically() {
    let mut spec = spec_env(&["download", "package"]);
    spec.fakes["download"].push_success(vec![("audio.out", b"pcm".as_slice())]);
    spec.fakes["package"].push_success(vec![("session.zip", b"zip".as_slice())]);
    spec.start();

    let id = spec.orch.create_job(json!({"ref": "demo"})).unwrap();

    spec.wait_until("both stages complete", || {
        spec.orch
            .get_job(&id)
            .map(|m| {
                m.stage_status(&stage("download")) == StageStatus::Complete
                    && m.stage_status(&stage("package")) == StageStatus::Complete
            })
            .unwrap_or(false)
    })
    .await;
    spec.wait_for_state(&id, sf_core::JobState::Done).await;

    let meta = spec.orch.get_job(&id).unwrap();
    assert_eq!(meta.state, sf_core::JobState::Done);

    // Each stage ran exactly once and in pipeline order
    assert_eq!(spec.fakes["download"].calls().len(), 1);
    assert_eq!(spec.fakes["package"].calls().len(), 1);

    let artifacts = spec.orch.get_job_artifacts(&id).unwrap();
    assert_eq!(artifacts["download"], vec!["audio.out"]);
    assert_eq!(artifacts["package"], vec!["session.zip"]);

    // Two full CLAIMED/RUNNING/DONE trips show in the log
    let log = spec.orch.get_job_log(&id).unwrap();
    let transitions = log
        .iter()
        .filter(|l| l.contains("Transitioned to"))
        .count();
    assert!(transitions >= 6, "log: {log:#?}");
    assert!(log.iter().any(|l| l.ends_with("queued for stage package")));
    assert!(log.iter().any(|l| l.ends_with("pipeline complete")));

    spec.shutdown().await;
}

#[tokio::test]
async fn failed_first_stage_stops_the_pipeline() {
    let mut spec = spec_env(&["download", "package"]);
    spec.fakes["download"].push_failure("no_source", "reference not resolvable");
    spec.start();

    let id = spec.orch.create_job(json!({"ref": "nowhere"})).unwrap();
    spec.wait_for_state(&id, sf_core::JobState::Failed).await;

    let meta = spec.orch.get_job(&id).unwrap();
    assert_eq!(meta.stage_status(&stage("download")), StageStatus::Failed);
    assert_eq!(
        meta.stage_status(&stage("package")),
        StageStatus::NotStarted
    );
    assert!(spec.fakes["package"].calls().is_empty(), "stage 2 never ran");

    spec.shutdown().await;
}

#[tokio::test]
async fn retry_after_mid_pipeline_failure_resumes_without_redoing_stage_one() {
    let mut spec = spec_env(&["download", "package"]);
    spec.fakes["package"].push_failure("packer_oom", "zip writer out of memory");
    spec.start();

    let id = spec.orch.create_job(json!({})).unwrap();
    spec.wait_for_state(&id, sf_core::JobState::Failed).await;
    assert_eq!(spec.fakes["download"].calls().len(), 1);

    // Retry re-enters at stage 1; the completed download fast-forwards
    spec.orch.retry_job(&id, "retry after packer fix").unwrap();
    spec.wait_until("package complete", || {
        spec.orch
            .get_job(&id)
            .map(|m| m.stage_status(&stage("package")) == StageStatus::Complete)
            .unwrap_or(false)
    })
    .await;
    spec.wait_for_state(&id, sf_core::JobState::Done).await;

    assert_eq!(
        spec.fakes["download"].calls().len(),
        1,
        "download not redone"
    );
    assert_eq!(spec.fakes["package"].calls().len(), 2);

    spec.shutdown().await;
}
