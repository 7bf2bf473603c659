// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime assembly: one constructor wires config, clock, id generation
//! and stage processors into the orchestrator, worker pools, and
//! reclaimer. Nothing is looked up globally; everything an operation
//! needs travels through this context.

use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::orchestrator::Orchestrator;
use crate::queue::{InMemoryQueue, JobQueue};
use crate::reclaimer::Reclaimer;
use crate::worker::{StageDeps, WorkerPool};
use sf_adapters::StageProcessor;
use sf_core::{Clock, Config, IdGen, StageName};
use sf_storage::{JobIndex, JobMover, MetadataStore, StorageLayout};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const INDEX_FILE: &str = "index.json";

/// The assembled engine: facade plus background machinery.
pub struct Runtime<C: Clock, G: IdGen> {
    orchestrator: Arc<Orchestrator<C, G>>,
    dispatcher: Arc<Dispatcher<C>>,
    store: Arc<MetadataStore<C>>,
    index: Arc<JobIndex>,
    queue: Arc<InMemoryQueue>,
    worker_pool: Option<WorkerPool<C>>,
    reclaimer: Option<Reclaimer<C>>,
    reclaimer_task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl<C: Clock, G: IdGen> Runtime<C, G> {
    /// Build the runtime. Establishes the directory layout and refuses
    /// to run when the storage root cannot do atomic cross-directory
    /// renames.
    pub fn new(
        config: &Config,
        clock: C,
        idgen: G,
        processors: HashMap<StageName, Arc<dyn StageProcessor>>,
    ) -> Result<Self, EngineError> {
        let pipeline = config.pipeline()?;
        let layout = StorageLayout::new(&config.storage_root);
        layout.ensure()?;
        layout.probe_atomic_rename()?;

        let index = Arc::new(JobIndex::open(config.storage_root.join(INDEX_FILE)));
        let store = Arc::new(MetadataStore::new(layout, clock, config));
        let mover = Arc::new(JobMover::new(Arc::clone(&store)).with_index(Arc::clone(&index)));
        let queue = Arc::new(InMemoryQueue::new(&pipeline));
        let queue_dyn: Arc<dyn JobQueue> = queue.clone();
        let dispatcher = Arc::new(Dispatcher::new(
            pipeline.clone(),
            Arc::clone(&queue_dyn),
            Arc::clone(&store),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&mover),
            Arc::clone(&dispatcher),
            Arc::clone(&index),
            pipeline.clone(),
            idgen,
        ));

        let cancel = CancellationToken::new();
        let deps = Arc::new(StageDeps {
            pipeline,
            store: Arc::clone(&store),
            mover: Arc::clone(&mover),
            dispatcher: Arc::clone(&dispatcher),
            queue: queue_dyn,
            processors,
        });
        let worker_pool = WorkerPool::new(deps, cancel.clone());
        let reclaimer = Reclaimer::new(
            Arc::clone(&store),
            Arc::clone(&mover),
            Arc::clone(&dispatcher),
            config.reclaim_interval(),
        );

        Ok(Self {
            orchestrator,
            dispatcher,
            store,
            index,
            queue,
            worker_pool: Some(worker_pool),
            reclaimer: Some(reclaimer),
            reclaimer_task: None,
            cancel,
        })
    }

    /// Cold start: rebuild the derived index from filesystem truth,
    /// requeue pending work, then spawn workers and the reclaimer.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let rows = self.index.rebuild(&self.store)?;
        let requeued = self.dispatcher.requeue_from_disk()?;
        info!(index_rows = rows, requeued, "engine starting");

        if let Some(pool) = self.worker_pool.as_mut() {
            pool.spawn_all()?;
        }
        if let Some(reclaimer) = self.reclaimer.take() {
            let cancel = self.cancel.clone();
            self.reclaimer_task = Some(tokio::spawn(reclaimer.run(cancel)));
        }
        Ok(())
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator<C, G>> {
        Arc::clone(&self.orchestrator)
    }

    /// Graceful shutdown: stop handing out queue items, let in-flight
    /// stage work finish or time out, stop the reclaimer.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        self.queue.shutdown();
        if let Some(pool) = self.worker_pool.take() {
            pool.join().await;
        }
        if let Some(task) = self.reclaimer_task.take() {
            let _ = task.await;
        }
        info!("engine stopped");
    }
}
