// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The derived query index: a rebuildable mirror of filesystem truth.
//!
//! The index is a single JSON file of rows, sorted the way `enumerate`
//! sorts, written atomically. It is never authoritative: deleting it and
//! rebuilding from a scan reproduces it byte-for-byte. Mutators update
//! it best-effort and keep going when the update fails.

use crate::record::JobMetadata;
use crate::store::{MetadataStore, StoreError};
use crate::time::{ts_millis, ts_millis_opt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sf_core::{Clock, JobId, JobState};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors from explicit index operations (rebuild, persist).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One row of the derived index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRow {
    pub job_id: JobId,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(
        default,
        with = "ts_millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub lease_expires_at: Option<u64>,
    #[serde(with = "ts_millis")]
    pub created_at: u64,
    #[serde(with = "ts_millis")]
    pub updated_at: u64,
    /// The full metadata record, serialized.
    pub metadata: serde_json::Value,
}

impl IndexRow {
    fn from_metadata(meta: &JobMetadata) -> Result<Self, serde_json::Error> {
        Ok(Self {
            job_id: meta.id.clone(),
            state: meta.state,
            owner_id: meta.owner_id.clone(),
            lease_expires_at: meta.lease_expires_at,
            created_at: meta.created_at,
            updated_at: meta.updated_at,
            metadata: serde_json::to_value(meta)?,
        })
    }
}

/// The index file plus its in-memory mirror.
pub struct JobIndex {
    path: PathBuf,
    rows: Mutex<BTreeMap<JobId, IndexRow>>,
}

impl JobIndex {
    /// Open an index file. A missing or unreadable file yields an empty
    /// index; the rebuilder makes it whole again.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rows = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Vec<IndexRow>>(&bytes) {
                Ok(rows) => rows.into_iter().map(|r| (r.job_id.clone(), r)).collect(),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt index file, starting empty");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            rows: Mutex::new(rows),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wipe the index and repopulate it from filesystem truth.
    /// Returns the number of rows written.
    pub fn rebuild<C: Clock>(&self, store: &MetadataStore<C>) -> Result<usize, IndexError> {
        let entries = store.enumerate()?;
        let mut rows = self.rows.lock();
        rows.clear();
        for entry in entries {
            let Some(meta) = entry.metadata else {
                warn!(job_id = %entry.id, "quarantined job omitted from index");
                continue;
            };
            rows.insert(entry.id.clone(), IndexRow::from_metadata(&meta)?);
        }
        let count = rows.len();
        Self::persist(&self.path, &rows)?;
        Ok(count)
    }

    /// Best-effort row update after a mutation. Failures are logged and
    /// swallowed; the index is recoverable by rebuild.
    pub fn note(&self, meta: &JobMetadata) {
        let row = match IndexRow::from_metadata(meta) {
            Ok(row) => row,
            Err(e) => {
                warn!(job_id = %meta.id, error = %e, "index row serialization failed");
                return;
            }
        };
        let mut rows = self.rows.lock();
        rows.insert(meta.id.clone(), row);
        if let Err(e) = Self::persist(&self.path, &rows) {
            warn!(path = %self.path.display(), error = %e, "best-effort index update failed");
        }
    }

    /// Best-effort removal (administrative job deletion).
    pub fn remove(&self, id: &JobId) {
        let mut rows = self.rows.lock();
        if rows.remove(id).is_some() {
            if let Err(e) = Self::persist(&self.path, &rows) {
                warn!(path = %self.path.display(), error = %e, "best-effort index removal failed");
            }
        }
    }

    /// Current rows, `createdAt` descending, id ascending on ties.
    pub fn rows(&self) -> Vec<IndexRow> {
        let rows = self.rows.lock();
        let mut out: Vec<IndexRow> = rows.values().cloned().collect();
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        out
    }

    /// Atomic write of the sorted row set (tmp + rename). Deterministic
    /// for a given row set, which is what makes rebuild reproducible.
    fn persist(path: &Path, rows: &BTreeMap<JobId, IndexRow>) -> Result<(), IndexError> {
        let mut sorted: Vec<&IndexRow> = rows.values().collect();
        sorted.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.job_id.cmp(&b.job_id))
        });
        let mut bytes = serde_json::to_vec_pretty(&sorted)?;
        bytes.push(b'\n');
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "index_tests.rs"]
mod tests;
