// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared helpers for other crates' tests. Gated behind the
//! `test-support` feature so production builds never see them.

use crate::config::{Config, StageSettings};
use crate::pipeline::StageName;
use std::path::Path;

/// A stage name from a literal; only valid literals belong in tests.
#[allow(clippy::unwrap_used)]
pub fn stage(name: &str) -> StageName {
    StageName::parse(name).unwrap()
}

/// A two-stage config (download -> package) rooted at `root`, with
/// short leases so reclaim tests stay fast.
pub fn two_stage_config(root: &Path) -> Config {
    let mut config = Config::new(root);
    config.stages = vec![
        StageSettings::new(stage("download")),
        StageSettings::new(stage("package")),
    ];
    for s in &mut config.stages {
        s.lease_secs = 5;
        s.backoff_ms = 10;
    }
    config
}

/// A single-stage config rooted at `root`.
pub fn single_stage_config(root: &Path) -> Config {
    let mut config = two_stage_config(root);
    config.stages.truncate(1);
    config
}
