// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests.

use crate::dispatcher::Dispatcher;
use crate::queue::{InMemoryQueue, JobQueue};
use crate::worker::StageDeps;
use serde_json::json;
use sf_adapters::{FakeProcessor, StageProcessor};
use sf_core::test_support::two_stage_config;
use sf_core::{Config, FakeClock, JobId, Pipeline, StageDef, StageName};
use sf_storage::{JobIndex, JobMetadata, JobMover, MetadataStore, StorageLayout};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    // Held for its Drop; the path must outlive the stores.
    #[allow(dead_code)]
    pub tmp: TempDir,
    pub config: Config,
    pub pipeline: Pipeline,
    pub clock: FakeClock,
    pub store: Arc<MetadataStore<FakeClock>>,
    pub mover: Arc<JobMover<FakeClock>>,
    pub queue: Arc<InMemoryQueue>,
    pub dispatcher: Arc<Dispatcher<FakeClock>>,
    pub index: Arc<JobIndex>,
}

/// A two-stage (download -> package) environment on a tempdir.
pub fn test_env() -> TestEnv {
    let tmp = tempfile::tempdir().unwrap();
    let config = two_stage_config(tmp.path());
    env_from_config(tmp, config)
}

pub fn env_from_config(tmp: TempDir, config: Config) -> TestEnv {
    let pipeline = config.pipeline().unwrap();
    let clock = FakeClock::new();
    let layout = StorageLayout::new(&config.storage_root);
    layout.ensure().unwrap();
    let index = Arc::new(JobIndex::open(config.storage_root.join("index.json")));
    let store = Arc::new(MetadataStore::new(layout, clock.clone(), &config));
    let mover = Arc::new(JobMover::new(Arc::clone(&store)).with_index(Arc::clone(&index)));
    let queue = Arc::new(InMemoryQueue::new(&pipeline));
    let queue_dyn: Arc<dyn JobQueue> = queue.clone();
    let dispatcher = Arc::new(Dispatcher::new(
        pipeline.clone(),
        queue_dyn,
        Arc::clone(&store),
    ));
    TestEnv {
        tmp,
        config,
        pipeline,
        clock,
        store,
        mover,
        queue,
        dispatcher,
        index,
    }
}

impl TestEnv {
    pub fn create_job(&self, n: u32) -> JobId {
        let id = JobId::parse(format!("job-{}", n)).unwrap();
        let meta = JobMetadata::new(id.clone(), json!({"ref": n}), self.store.now_ms());
        self.store.create_job(&meta).unwrap();
        self.store.append_log(&id, "created").unwrap();
        id
    }

    pub fn stage(&self, name: &str) -> StageDef {
        let name = StageName::parse(name).unwrap();
        self.pipeline.get(&name).unwrap().clone()
    }

    /// Worker deps with one fake per stage; returns the fakes for
    /// scripting and call inspection.
    pub fn worker_deps(&self) -> (Arc<StageDeps<FakeClock>>, HashMap<String, Arc<FakeProcessor>>) {
        let mut fakes = HashMap::new();
        let mut processors: HashMap<StageName, Arc<dyn StageProcessor>> = HashMap::new();
        for stage in self.pipeline.stages() {
            let fake = Arc::new(FakeProcessor::new());
            fakes.insert(stage.name.as_str().to_string(), Arc::clone(&fake));
            processors.insert(stage.name.clone(), fake);
        }
        let queue_dyn: Arc<dyn JobQueue> = self.queue.clone();
        let deps = Arc::new(StageDeps {
            pipeline: self.pipeline.clone(),
            store: Arc::clone(&self.store),
            mover: Arc::clone(&self.mover),
            dispatcher: Arc::clone(&self.dispatcher),
            queue: queue_dyn,
            processors,
        });
        (deps, fakes)
    }
}
