// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The on-disk directory tree.
//!
//! ```text
//! storage_root/
//!   jobs/
//!     NEW/       {jobId}/  metadata, log/, <stage>/...
//!     CLAIMED/   {jobId}/
//!     RUNNING/   {jobId}/
//!     DONE/      {jobId}/
//!     FAILED/    {jobId}/
//!   uploads/             ingest inputs, opaque to the core
//!   artifactsPackaged/   final packages, opaque to the core
//! ```
//!
//! Paths are never cached across mover invocations; a job's directory is
//! only stable between two renames.

use sf_core::{JobId, JobState};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const JOBS_DIR: &str = "jobs";
const UPLOADS_DIR: &str = "uploads";
const PACKAGED_DIR: &str = "artifactsPackaged";
const SCRATCH_DIR: &str = "scratch";

/// Errors establishing the layout.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("storage root {root} does not support atomic cross-directory rename: {message}")]
    NonAtomicFilesystem { root: PathBuf, message: String },
}

/// Path arithmetic for the storage root. Cheap to clone; holds no handles.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join(JOBS_DIR)
    }

    pub fn state_dir(&self, state: JobState) -> PathBuf {
        self.jobs_dir().join(state.dir_name())
    }

    pub fn job_dir(&self, state: JobState, id: &JobId) -> PathBuf {
        self.state_dir(state).join(id.as_str())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join(UPLOADS_DIR)
    }

    pub fn packaged_dir(&self) -> PathBuf {
        self.root.join(PACKAGED_DIR)
    }

    /// Where the final package for a job lands.
    pub fn package_path(&self, id: &JobId) -> PathBuf {
        self.packaged_dir().join(format!("{}.zip", id))
    }

    /// Scratch space for in-flight stage invocations. Contents are
    /// disposable; never part of job state.
    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join(SCRATCH_DIR)
    }

    /// A unique landing path for an uploaded ingest input.
    ///
    /// `token` makes the name unique; the original name is sanitized to
    /// a path-safe suffix so operators can still recognize the file.
    pub fn upload_path(&self, token: &str, original_name: &str) -> PathBuf {
        let safe: String = original_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.uploads_dir().join(format!("{}-{}", token, safe))
    }

    /// Create every directory the layout requires. Idempotent.
    pub fn ensure(&self) -> Result<(), LayoutError> {
        for state in JobState::ALL {
            std::fs::create_dir_all(self.state_dir(state))?;
        }
        std::fs::create_dir_all(self.uploads_dir())?;
        std::fs::create_dir_all(self.packaged_dir())?;
        std::fs::create_dir_all(self.scratch_dir())?;
        Ok(())
    }

    /// Verify that cross-directory rename works within `jobs/`.
    ///
    /// Renames a sentinel file NEW -> CLAIMED and back. A filesystem
    /// boundary between state directories shows up here as `EXDEV`, in
    /// which case the orchestrator must refuse to run: a copy+delete
    /// fallback would break the one-directory-per-job invariant.
    pub fn probe_atomic_rename(&self) -> Result<(), LayoutError> {
        let name = format!(".rename-probe-{}", std::process::id());
        let probe_new = self.state_dir(JobState::New).join(&name);
        let probe_claimed = self.state_dir(JobState::Claimed).join(&name);

        std::fs::write(&probe_new, b"probe")?;
        let round_trip = std::fs::rename(&probe_new, &probe_claimed)
            .and_then(|_| std::fs::rename(&probe_claimed, &probe_new));
        let cleanup = std::fs::remove_file(&probe_new);

        match round_trip {
            Ok(()) => {
                cleanup?;
                Ok(())
            }
            Err(e) => Err(LayoutError::NonAtomicFilesystem {
                root: self.root.clone(),
                message: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "layout_tests.rs"]
mod tests;
