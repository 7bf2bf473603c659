// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable per-stage artifact files.
//!
//! Artifacts live under `<jobDir>/<stage>/` and move with the job when
//! the mover renames the whole folder. A written artifact is never
//! rewritten; re-executions pick fresh names.

use crate::store::{MetadataStore, StoreError};
use sf_core::{Clock, JobId, StageName};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

const METADATA_FILE: &str = "metadata";
const LOG_DIR: &str = "log";

fn valid_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

impl<C: Clock> MetadataStore<C> {
    /// Write one artifact file, failing if `(stage, file_name)` already
    /// exists. A `NotFound` here can mean the job folder was renamed
    /// mid-write by a concurrent transition; callers re-locate and retry.
    pub fn write_artifact(
        &self,
        id: &JobId,
        stage: &StageName,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StoreError> {
        if !valid_file_name(file_name) {
            return Err(StoreError::InvalidFileName(file_name.to_string()));
        }
        let (_, dir) = self.locate(id)?;
        let stage_dir = dir.join(stage.as_str());
        if let Err(e) = std::fs::create_dir_all(&stage_dir) {
            return Err(if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(id.clone())
            } else {
                e.into()
            });
        }
        let path = stage_dir.join(file_name);
        let mut file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::ArtifactExists {
                    stage: stage.as_str().to_string(),
                    file_name: file_name.to_string(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(path)
    }

    /// Artifact files per stage for the job's current folder, names
    /// sorted within each stage.
    pub fn list_artifacts(
        &self,
        id: &JobId,
    ) -> Result<BTreeMap<String, Vec<String>>, StoreError> {
        let (_, dir) = self.locate(id)?;
        let mut result = BTreeMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == LOG_DIR || name == METADATA_FILE {
                continue;
            }
            let mut files = Vec::new();
            for file in std::fs::read_dir(entry.path())? {
                let file = file?;
                if file.file_type()?.is_file() {
                    if let Some(file_name) = file.file_name().to_str() {
                        files.push(file_name.to_string());
                    }
                }
            }
            files.sort();
            result.insert(name.to_string(), files);
        }
        Ok(result)
    }
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
