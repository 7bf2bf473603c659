// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! S7: cold start rebuilds the derived index and listing from
//! filesystem truth alone.

use crate::prelude::*;
use serde_json::json;
use sf_core::{Actor, JobState};
use sf_engine::ListFilter;
use std::time::Duration;

#[tokio::test]
async fn restart_reproduces_listing_and_index_from_disk() {
    // The storage root outlives both engine "lives"
    let root_guard = tempfile::tempdir().unwrap();
    let storage_root = root_guard.path().join("store");
    let index_path = storage_root.join("index.json");

    // --- First life: three jobs parked in NEW, DONE, RUNNING ---
    let spec = spec_env_from(
        tempfile::tempdir().unwrap(),
        config_with_stages(&storage_root, &["download"]),
    );
    let worker = Actor::Worker(stage("download"));

    let in_new = spec.orch.create_job(json!({"ref": 1})).unwrap();
    spec.clock.advance(Duration::from_secs(1));

    let in_done = spec.orch.create_job(json!({"ref": 2})).unwrap();
    spec.orch
        .transition_job(&in_done, JobState::Claimed, &Actor::System)
        .unwrap();
    spec.orch
        .transition_job(&in_done, JobState::Running, &worker)
        .unwrap();
    let mut meta = spec.store.read_metadata(&in_done).unwrap();
    meta.set_stage_record(
        &stage("download"),
        sf_storage::StageRecord::complete(spec.store.now_ms()),
    )
    .unwrap();
    spec.store.write_metadata(&mut meta).unwrap();
    spec.orch
        .transition_job(&in_done, JobState::Done, &worker)
        .unwrap();
    spec.clock.advance(Duration::from_secs(1));

    let in_running = spec.orch.create_job(json!({"ref": 3})).unwrap();
    spec.orch
        .transition_job(&in_running, JobState::Claimed, &Actor::System)
        .unwrap();
    spec.orch
        .transition_job(&in_running, JobState::Running, &worker)
        .unwrap();

    let index_before = std::fs::read(&index_path).unwrap();
    drop(spec);

    // --- Crash: the derived index is lost entirely ---
    std::fs::remove_file(&index_path).unwrap();

    // --- Second life ---
    let mut config = config_with_stages(&storage_root, &["download"]);
    config.reclaim_interval_secs = 3600; // keep the reclaimer out of this test
    let mut spec = spec_env_from(tempfile::tempdir().unwrap(), config);

    // Rebuilding from a scan reproduces the incrementally maintained
    // index byte for byte
    let rebuilt = sf_storage::JobIndex::open(&index_path);
    rebuilt.rebuild(&spec.store).unwrap();
    let index_after = std::fs::read(&index_path).unwrap();
    assert_eq!(index_before, index_after);

    // Listing shows all three jobs, newest first
    let listing = spec.orch.list_jobs(&ListFilter::default()).unwrap();
    let ids: Vec<_> = listing.iter().map(|s| s.id.clone()).collect();
    assert_eq!(
        ids,
        vec![in_running.clone(), in_done.clone(), in_new.clone()]
    );

    // Cold-start requeue picks up the NEW job and the workers (fake,
    // default success) drive it to DONE; the DONE job stays DONE
    spec.start();
    spec.wait_for_state(&in_new, JobState::Done).await;
    assert_eq!(spec.state_of(&in_done), JobState::Done);
    assert_eq!(spec.state_of(&in_running), JobState::Running);

    spec.shutdown().await;
}
