// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared harness for the behavioral specs.

use sf_adapters::{FakeProcessor, StageProcessor};
use sf_core::{
    Config, FakeClock, JobId, JobState, SequentialIdGen, StageName, StageSettings,
};
use sf_engine::{Orchestrator, Runtime};
use sf_storage::{JobMover, MetadataStore, StorageLayout};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub fn stage(name: &str) -> StageName {
    StageName::parse(name).unwrap()
}

pub fn config_with_stages(root: &std::path::Path, stages: &[&str]) -> Config {
    let mut config = Config::new(root);
    config.stages = stages
        .iter()
        .map(|name| {
            let mut s = StageSettings::new(stage(name));
            s.lease_secs = 5;
            s.backoff_ms = 10;
            s
        })
        .collect();
    config
}

/// One spec environment: an engine runtime plus a "side door" store and
/// mover over the same storage root. The side door is how specs poke at
/// filesystem truth the way a concurrent process (or crash) would.
pub struct Spec {
    #[allow(dead_code)]
    pub tmp: TempDir,
    pub config: Config,
    pub clock: FakeClock,
    pub orch: Arc<Orchestrator<FakeClock, SequentialIdGen>>,
    pub store: Arc<MetadataStore<FakeClock>>,
    pub mover: Arc<JobMover<FakeClock>>,
    pub fakes: HashMap<String, Arc<FakeProcessor>>,
    runtime: Option<Runtime<FakeClock, SequentialIdGen>>,
}

pub fn spec_env(stages: &[&str]) -> Spec {
    let tmp = tempfile::tempdir().unwrap();
    let config = config_with_stages(tmp.path(), stages);
    spec_env_from(tmp, config)
}

pub fn spec_env_from(tmp: TempDir, config: Config) -> Spec {
    let clock = FakeClock::new();

    let mut fakes = HashMap::new();
    let mut processors: HashMap<StageName, Arc<dyn StageProcessor>> = HashMap::new();
    for settings in &config.stages {
        let fake = Arc::new(FakeProcessor::new());
        fakes.insert(settings.name.as_str().to_string(), Arc::clone(&fake));
        processors.insert(settings.name.clone(), fake);
    }

    let runtime = Runtime::new(&config, clock.clone(), SequentialIdGen::default(), processors)
        .unwrap();
    let orch = runtime.orchestrator();

    // Independent store/mover over the same root: filesystem is the
    // only shared state, so this sees exactly what the runtime sees.
    let layout = StorageLayout::new(&config.storage_root);
    let store = Arc::new(MetadataStore::new(layout, clock.clone(), &config));
    let mover = Arc::new(JobMover::new(Arc::clone(&store)));

    Spec {
        tmp,
        config,
        clock,
        orch,
        store,
        mover,
        fakes,
        runtime: Some(runtime),
    }
}

impl Spec {
    /// Start workers and the reclaimer (for end-to-end scenarios).
    pub fn start(&mut self) {
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.start().unwrap();
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown().await;
        }
    }

    pub fn state_of(&self, id: &JobId) -> JobState {
        self.store.locate(id).unwrap().0
    }

    /// How many state directories contain this job id (invariant 1
    /// demands exactly one).
    pub fn dirs_containing(&self, id: &JobId) -> usize {
        let layout = StorageLayout::new(&self.config.storage_root);
        JobState::ALL
            .iter()
            .filter(|s| layout.job_dir(**s, id).is_dir())
            .count()
    }

    /// Poll filesystem truth until the job reaches `state`.
    pub async fn wait_for_state(&self, id: &JobId, state: JobState) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        loop {
            if let Ok((found, _)) = self.store.locate(id) {
                if found == state {
                    return;
                }
            }
            assert!(
                std::time::Instant::now() < deadline,
                "timed out waiting for {} to reach {}",
                id,
                state
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until `predicate` holds.
    pub async fn wait_until(&self, what: &str, predicate: impl Fn() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !predicate() {
            assert!(
                std::time::Instant::now() < deadline,
                "timed out waiting for {}",
                what
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
