// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn load_config_defaults_when_no_file() {
    let config = load_config(None).unwrap();
    assert!(!config.stages.is_empty());
}

#[test]
fn load_config_explicit_path_must_exist() {
    let missing = Path::new("/definitely/not/here.toml");
    assert!(load_config(Some(missing)).is_err());
}

#[test]
fn load_config_reads_explicit_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("sf.toml");
    std::fs::write(&path, "storage_root = \"/data\"\nreclaim_interval_secs = 7\n").unwrap();
    let config = load_config(Some(&path)).unwrap();
    assert_eq!(config.reclaim_interval_secs, 7);
}

#[test]
fn build_processors_requires_a_command_per_stage() {
    let mut config = Config::new("/data");
    let err = build_processors(&config).unwrap_err();
    assert!(matches!(err, LifecycleError::StageCommandMissing(_)));

    for stage in &mut config.stages {
        stage.command = Some(vec!["/bin/true".to_string()]);
    }
    let processors = build_processors(&config).unwrap();
    assert_eq!(processors.len(), config.stages.len());
}

#[test]
fn lock_is_exclusive() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daemon.pid");

    let held = acquire_lock(&path).unwrap();
    let err = acquire_lock(&path).unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyRunning(_)));

    drop(held);
    acquire_lock(&path).unwrap();
}

#[test]
fn lock_file_records_pid() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("daemon.pid");
    let _held = acquire_lock(&path).unwrap();
    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.trim(), std::process::id().to_string());
}
