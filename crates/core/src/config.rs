// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator configuration.
//!
//! One TOML-deserializable record carries everything the core consumes:
//! the storage root, the ordered stage table, reclaim cadence, and the
//! metadata/log size bounds. All components receive values from here at
//! construction; nothing reads configuration globally.

use crate::pipeline::{Pipeline, PipelineError, StageDef, StageName};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Per-stage tunables. Durations are plain integers for TOML ergonomics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSettings {
    pub name: StageName,
    #[serde(default = "defaults::concurrency")]
    pub concurrency: u32,
    #[serde(default = "defaults::lease_secs")]
    pub lease_secs: u64,
    #[serde(default = "defaults::timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "defaults::retries")]
    pub retries: u32,
    #[serde(default = "defaults::backoff_ms")]
    pub backoff_ms: u64,
    /// External command run by this stage's processor, if any.
    /// The core never interprets it; the daemon hands it to the
    /// command-backed stage adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
}

impl StageSettings {
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            concurrency: defaults::concurrency(),
            lease_secs: defaults::lease_secs(),
            timeout_secs: defaults::timeout_secs(),
            retries: defaults::retries(),
            backoff_ms: defaults::backoff_ms(),
            command: None,
        }
    }

    fn stage_def(&self) -> StageDef {
        StageDef {
            name: self.name.clone(),
            concurrency: self.concurrency,
            lease: Duration::from_secs(self.lease_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            retries: self.retries,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// The single configuration record the core consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the directory tree that IS the job state.
    pub storage_root: PathBuf,
    #[serde(default = "default_stages")]
    pub stages: Vec<StageSettings>,
    /// Cadence of the lease-reclaim sweep.
    #[serde(default = "defaults::reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,
    /// Upper bound on a metadata record, read or written.
    #[serde(default = "defaults::max_metadata_bytes")]
    pub max_metadata_bytes: u64,
    /// Rotate a job log once it exceeds this size. Absent = never rotate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_log_bytes: Option<u64>,
}

mod defaults {
    pub fn concurrency() -> u32 {
        1
    }
    pub fn lease_secs() -> u64 {
        600
    }
    pub fn timeout_secs() -> u64 {
        3600
    }
    pub fn retries() -> u32 {
        2
    }
    pub fn backoff_ms() -> u64 {
        1000
    }
    pub fn reclaim_interval_secs() -> u64 {
        60
    }
    pub fn max_metadata_bytes() -> u64 {
        1024 * 1024
    }
}

/// The stock audio pipeline: ingest, stem separation, lyrics, packaging.
fn default_stages() -> Vec<StageSettings> {
    ["download", "separation", "lyrics", "package"]
        .into_iter()
        .map(|name| StageSettings::new(StageName::known(name)))
        .collect()
}

impl Config {
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            stages: default_stages(),
            reclaim_interval_secs: defaults::reclaim_interval_secs(),
            max_metadata_bytes: defaults::max_metadata_bytes(),
            max_log_bytes: None,
        }
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Build the validated pipeline from the stage table.
    pub fn pipeline(&self) -> Result<Pipeline, ConfigError> {
        let stages = self.stages.iter().map(StageSettings::stage_def).collect();
        Ok(Pipeline::new(stages)?)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
