// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Metadata store: every read and write of a job's record and log.
//!
//! All operations locate the job's directory fresh; nothing here caches
//! a path across calls, because a concurrent mover may rename the folder
//! at any time. Reads never cause writes. Metadata writes are
//! write-then-rename within the job directory, so a reader always sees
//! either the previous or the new record, never a torn one.

use crate::layout::StorageLayout;
use crate::record::JobMetadata;
use sf_core::{Clock, Config, JobId, JobState};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const METADATA_FILE: &str = "metadata";
const LOG_DIR: &str = "log";
const LOG_FILE: &str = "job.log";

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    JobExists(JobId),
    #[error("metadata for job {job_id} is corrupt: {message}")]
    Corrupt { job_id: JobId, message: String },
    #[error("metadata for job {job_id} exceeds {limit} bytes")]
    MetadataTooLarge { job_id: JobId, limit: u64 },
    #[error("artifact already exists: {stage}/{file_name}")]
    ArtifactExists { stage: String, file_name: String },
    #[error("invalid artifact file name: {0:?}")]
    InvalidFileName(String),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One entry from a full enumeration. `metadata` is `None` when the
/// record failed to parse (the job is quarantined but still listed).
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub id: JobId,
    pub state: JobState,
    pub metadata: Option<JobMetadata>,
}

/// Reads and writes job records, logs, and artifacts under one layout.
pub struct MetadataStore<C: Clock> {
    layout: StorageLayout,
    clock: C,
    max_metadata_bytes: u64,
    max_log_bytes: Option<u64>,
}

impl<C: Clock> MetadataStore<C> {
    pub fn new(layout: StorageLayout, clock: C, config: &Config) -> Self {
        Self {
            layout,
            clock,
            max_metadata_bytes: config.max_metadata_bytes,
            max_log_bytes: config.max_log_bytes,
        }
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Find which state directory currently holds the job.
    pub fn locate(&self, id: &JobId) -> Result<(JobState, PathBuf), StoreError> {
        for state in JobState::ALL {
            let dir = self.layout.job_dir(state, id);
            if dir.is_dir() {
                return Ok((state, dir));
            }
        }
        Err(StoreError::NotFound(id.clone()))
    }

    /// Create a job directory in `NEW` and write its initial record.
    pub fn create_job(&self, meta: &JobMetadata) -> Result<(), StoreError> {
        if self.locate(&meta.id).is_ok() {
            return Err(StoreError::JobExists(meta.id.clone()));
        }
        let dir = self.layout.job_dir(JobState::New, &meta.id);
        std::fs::create_dir_all(dir.join(LOG_DIR))?;
        self.write_metadata_at(&dir, meta)
    }

    /// Load the record. When the record's `state` field disagrees with
    /// the directory the folder was found in, the filesystem wins and
    /// the divergence is reported as a recovery event.
    pub fn read_metadata(&self, id: &JobId) -> Result<JobMetadata, StoreError> {
        let (state, dir) = self.locate(id)?;
        let mut meta = self.read_metadata_at(id, &dir)?;
        if meta.state != state {
            warn!(
                job_id = %id,
                recorded = %meta.state,
                actual = %state,
                "metadata state diverged from state directory; filesystem wins"
            );
            meta.state = state;
        }
        Ok(meta)
    }

    /// Rewrite the record in the job's *current* state directory,
    /// stamping `state` from the directory and bumping `updated_at`.
    pub fn write_metadata(&self, meta: &mut JobMetadata) -> Result<(), StoreError> {
        let (state, dir) = self.locate(&meta.id)?;
        meta.state = state;
        meta.touch(self.now_ms());
        self.write_metadata_at(&dir, meta)
    }

    pub(crate) fn read_metadata_at(
        &self,
        id: &JobId,
        dir: &Path,
    ) -> Result<JobMetadata, StoreError> {
        let path = dir.join(METADATA_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if bytes.len() as u64 > self.max_metadata_bytes {
            return Err(StoreError::MetadataTooLarge {
                job_id: id.clone(),
                limit: self.max_metadata_bytes,
            });
        }
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            job_id: id.clone(),
            message: e.to_string(),
        })
    }

    /// Serialize and atomically replace `dir/metadata` (tmp + rename in
    /// the same directory, so the swap stays on one filesystem).
    pub(crate) fn write_metadata_at(
        &self,
        dir: &Path,
        meta: &JobMetadata,
    ) -> Result<(), StoreError> {
        let mut bytes = serde_json::to_vec_pretty(meta)?;
        bytes.push(b'\n');
        if bytes.len() as u64 > self.max_metadata_bytes {
            return Err(StoreError::MetadataTooLarge {
                job_id: meta.id.clone(),
                limit: self.max_metadata_bytes,
            });
        }
        let tmp = dir.join(format!("{}.tmp", METADATA_FILE));
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, dir.join(METADATA_FILE))?;
        Ok(())
    }

    /// Append one timestamped line to the job's log.
    ///
    /// The job directory is resolved immediately before the write; the
    /// open file handle keeps the append valid even if a rename lands
    /// between resolution and write. A rename landing *between* the
    /// resolve and the open shows up as a missing path; one re-resolve
    /// covers that window.
    pub fn append_log(&self, id: &JobId, message: &str) -> Result<(), StoreError> {
        match self.append_log_once(id, message) {
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                self.append_log_once(id, message)
            }
            other => other,
        }
    }

    fn append_log_once(&self, id: &JobId, message: &str) -> Result<(), StoreError> {
        let (_, dir) = self.locate(id)?;
        let log_dir = dir.join(LOG_DIR);
        std::fs::create_dir_all(&log_dir)?;
        let path = log_dir.join(LOG_FILE);
        self.rotate_log_if_needed(&path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let line = format!(
            "[{}] {}\n",
            crate::time::format_epoch_ms(self.now_ms()),
            message
        );
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn rotate_log_if_needed(&self, path: &Path) -> Result<(), StoreError> {
        let Some(max) = self.max_log_bytes else {
            return Ok(());
        };
        match std::fs::metadata(path) {
            Ok(m) if m.len() >= max => {
                let rotated = path.with_extension("log.1");
                std::fs::rename(path, rotated)?;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// All log lines for a job, oldest first. Empty when no line has
    /// been written yet.
    pub fn read_log(&self, id: &JobId) -> Result<Vec<String>, StoreError> {
        let (_, dir) = self.locate(id)?;
        let path = dir.join(LOG_DIR).join(LOG_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Job ids currently in one state directory, sorted.
    pub fn list_by_state(&self, state: JobState) -> Result<Vec<JobId>, StoreError> {
        let dir = self.layout.state_dir(state);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Ok(id) = JobId::parse(name) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Every job on disk, sorted by `createdAt` descending with ties
    /// broken by id. Quarantined (corrupt) jobs appear with `metadata:
    /// None` and sort last.
    pub fn enumerate(&self) -> Result<Vec<JobEntry>, StoreError> {
        let mut entries = Vec::new();
        for state in JobState::ALL {
            for id in self.list_by_state(state)? {
                let dir = self.layout.job_dir(state, &id);
                let metadata = match self.read_metadata_at(&id, &dir) {
                    Ok(mut meta) => {
                        meta.state = state;
                        Some(meta)
                    }
                    Err(StoreError::NotFound(_)) => continue, // moved mid-scan
                    Err(e) => {
                        warn!(job_id = %id, error = %e, "skipping unreadable metadata during enumeration");
                        None
                    }
                };
                entries.push(JobEntry {
                    id,
                    state,
                    metadata,
                });
            }
        }
        entries.sort_by(|a, b| {
            let a_created = a.metadata.as_ref().map(|m| m.created_at).unwrap_or(0);
            let b_created = b.metadata.as_ref().map(|m| m.created_at).unwrap_or(0);
            b_created.cmp(&a_created).then_with(|| a.id.cmp(&b.id))
        });
        Ok(entries)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
