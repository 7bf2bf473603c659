// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: configuration, single-instance lock, tracing,
//! engine startup, signal-driven shutdown.

use fs2::FileExt;
use sf_adapters::{CommandProcessor, StageProcessor};
use sf_core::{Config, ConfigError, StageName, SystemClock, UuidIdGen};
use sf_engine::{EngineError, Runtime};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const DEFAULT_CONFIG_FILE: &str = "stemflow.toml";
const DEFAULT_STORAGE_ROOT: &str = "stemflow-data";

/// Errors that prevent the daemon from running.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("another daemon already holds {0}")]
    AlreadyRunning(PathBuf),
    #[error("stage {0} has no command configured")]
    StageCommandMissing(StageName),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve configuration: an explicit path must parse; otherwise
/// `./stemflow.toml` is used when present, else built-in defaults.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config, LifecycleError> {
    match path {
        Some(path) => Ok(Config::load(path)?),
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                Ok(Config::load(default)?)
            } else {
                Ok(Config::new(DEFAULT_STORAGE_ROOT))
            }
        }
    }
}

/// One command-backed processor per configured stage.
pub(crate) fn build_processors(
    config: &Config,
) -> Result<HashMap<StageName, Arc<dyn StageProcessor>>, LifecycleError> {
    let mut processors: HashMap<StageName, Arc<dyn StageProcessor>> = HashMap::new();
    for stage in &config.stages {
        let argv = stage
            .command
            .clone()
            .ok_or_else(|| LifecycleError::StageCommandMissing(stage.name.clone()))?;
        let processor = CommandProcessor::new(argv)?;
        processors.insert(stage.name.clone(), Arc::new(processor));
    }
    Ok(processors)
}

/// Take the exclusive daemon lock and record our pid in it.
pub(crate) fn acquire_lock(path: &Path) -> Result<File, LifecycleError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    if file.try_lock_exclusive().is_err() {
        return Err(LifecycleError::AlreadyRunning(path.to_path_buf()));
    }
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

fn init_tracing(storage_root: &Path) -> std::io::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(storage_root)?;
    let appender = tracing_appender::rolling::never(storage_root, "daemon.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

/// Run the daemon until SIGINT.
pub async fn run(config_path: Option<PathBuf>) -> Result<(), LifecycleError> {
    let config = load_config(config_path.as_deref())?;
    let _trace_guard = init_tracing(&config.storage_root)?;

    // NOTE(lifetime): held to keep the exclusive lock; released on drop
    let _lock_file = acquire_lock(&config.storage_root.join("daemon.pid"))?;

    let processors = build_processors(&config)?;
    let mut runtime = Runtime::new(&config, SystemClock, UuidIdGen, processors)?;
    runtime.start()?;
    info!(storage_root = %config.storage_root.display(), "sfd ready");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    runtime.shutdown().await;
    Ok(())
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
