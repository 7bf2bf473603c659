// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Universal invariants checked over facade-driven histories.

use crate::prelude::*;
use serde_json::json;
use sf_core::{Actor, JobState};
use sf_storage::StorageLayout;

/// Invariant 1: a job's folder exists in exactly one state directory
/// and the metadata `state` field matches it, at every step of a full
/// lifecycle.
#[tokio::test]
async fn one_directory_and_matching_record_throughout() {
    let spec = spec_env(&["download"]);
    let worker = Actor::Worker(stage("download"));
    let id = spec.orch.create_job(json!({})).unwrap();

    let check = |expected: JobState| {
        assert_eq!(spec.dirs_containing(&id), 1);
        let meta = spec.store.read_metadata(&id).unwrap();
        assert_eq!(meta.state, expected);
        // The raw on-disk record agrees too (read_metadata would mask
        // a divergence by design)
        let layout = StorageLayout::new(&spec.config.storage_root);
        let raw = std::fs::read_to_string(layout.job_dir(expected, &id).join("metadata")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["state"], expected.dir_name());
    };

    check(JobState::New);
    spec.orch
        .transition_job(&id, JobState::Claimed, &Actor::System)
        .unwrap();
    check(JobState::Claimed);
    spec.orch
        .transition_job(&id, JobState::Running, &worker)
        .unwrap();
    check(JobState::Running);
    spec.orch
        .transition_job(&id, JobState::Done, &worker)
        .unwrap();
    check(JobState::Done);
}

/// Invariant 4: `updatedAt` is strictly increasing across successful
/// moves, even with a frozen clock.
#[tokio::test]
async fn updated_at_strictly_increases_without_clock_progress() {
    let spec = spec_env(&["download"]);
    let worker = Actor::Worker(stage("download"));
    let id = spec.orch.create_job(json!({})).unwrap();

    let mut last = spec.orch.get_job(&id).unwrap().updated_at;
    for (to, actor) in [
        (JobState::Claimed, Actor::System),
        (JobState::Running, worker.clone()),
        (JobState::Done, worker),
    ] {
        spec.orch.transition_job(&id, to, &actor).unwrap();
        let now = spec.orch.get_job(&id).unwrap().updated_at;
        assert!(now > last, "updatedAt must strictly increase");
        last = now;
    }
}

/// Invariant 6 corollary: a failed move leaves every byte where it was.
#[tokio::test]
async fn rejected_moves_do_not_mutate() {
    let spec = spec_env(&["download"]);
    let id = spec.orch.create_job(json!({})).unwrap();
    let layout = StorageLayout::new(&spec.config.storage_root);
    let raw_before =
        std::fs::read(layout.job_dir(JobState::New, &id).join("metadata")).unwrap();

    for (to, actor) in [
        (JobState::Running, Actor::System),
        (JobState::Done, Actor::System),
        (JobState::Failed, Actor::User),
        (JobState::Claimed, Actor::User),
    ] {
        let _ = spec.orch.transition_job(&id, to, &actor).unwrap_err();
    }

    let raw_after = std::fs::read(layout.job_dir(JobState::New, &id).join("metadata")).unwrap();
    assert_eq!(raw_before, raw_after);
}

/// Invariant 6 (uniqueness): a second create with a fresh id never
/// collides; a job id exists at most once across all state dirs.
#[tokio::test]
async fn job_ids_are_globally_unique_across_states() {
    let spec = spec_env(&["download"]);
    let a = spec.orch.create_job(json!({})).unwrap();
    let b = spec.orch.create_job(json!({})).unwrap();
    assert_ne!(a, b);
    spec.orch
        .transition_job(&a, JobState::Claimed, &Actor::System)
        .unwrap();
    assert_eq!(spec.dirs_containing(&a), 1);
    assert_eq!(spec.dirs_containing(&b), 1);
}
