// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-job metadata record: the stable on-disk format.
//!
//! One JSON object per job. Stage records live as top-level keys under
//! their stage label; everything this version of the code does not
//! recognize is preserved byte-for-byte across read-modify-write cycles
//! via the flattened `rest` map.

use crate::time::{ts_millis, ts_millis_opt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sf_core::{JobId, JobState, Pipeline, StageName};

/// Outcome of one stage for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Complete,
    Failed,
    NotStarted,
}

/// One stage's record inside the metadata object.
///
/// `extra` carries arbitrary stage-specific data (artifact lists, track
/// counts, provider diagnostics) without this crate knowing about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub status: StageStatus,
    /// Short, non-sensitive classification code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// External collaborator that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(
        default,
        with = "ts_millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StageRecord {
    pub fn complete(finished_at: u64) -> Self {
        Self {
            status: StageStatus::Complete,
            reason: None,
            message: None,
            error: None,
            provider: None,
            finished_at: Some(finished_at),
            extra: Map::new(),
        }
    }

    pub fn failed(reason: impl Into<String>, message: impl Into<String>, finished_at: u64) -> Self {
        Self {
            status: StageStatus::Failed,
            reason: Some(reason.into()),
            message: Some(message.into()),
            error: None,
            provider: None,
            finished_at: Some(finished_at),
            extra: Map::new(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// The metadata record stored in each job directory.
///
/// Field order here fixes the JSON key order on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMetadata {
    pub id: JobId,
    pub state: JobState,
    #[serde(with = "ts_millis")]
    pub created_at: u64,
    #[serde(with = "ts_millis")]
    pub updated_at: u64,
    /// Opaque claimant token; set on claim, cleared on release/terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(
        default,
        with = "ts_millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub lease_expires_at: Option<u64>,
    /// Ingest descriptor; never read or validated by the core.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    /// Stage records (keyed by stage label) plus any unknown fields.
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl JobMetadata {
    /// A fresh record for a job born in `NEW`.
    pub fn new(id: JobId, input: Value, now_ms: u64) -> Self {
        Self {
            id,
            state: JobState::New,
            created_at: now_ms,
            updated_at: now_ms,
            owner_id: None,
            lease_expires_at: None,
            input,
            rest: Map::new(),
        }
    }

    /// Bump `updated_at`, keeping it strictly increasing even when the
    /// clock has not advanced a full millisecond between mutations.
    pub fn touch(&mut self, now_ms: u64) {
        self.updated_at = now_ms.max(self.updated_at + 1);
    }

    /// The recorded outcome of a stage, `NOT_STARTED` when absent.
    pub fn stage_status(&self, stage: &StageName) -> StageStatus {
        self.stage_record(stage)
            .map(|r| r.status)
            .unwrap_or(StageStatus::NotStarted)
    }

    /// The full stage record, if present and well-formed.
    pub fn stage_record(&self, stage: &StageName) -> Option<StageRecord> {
        let value = self.rest.get(stage.as_str())?;
        serde_json::from_value(value.clone()).ok()
    }

    pub fn set_stage_record(
        &mut self,
        stage: &StageName,
        record: StageRecord,
    ) -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(record)?;
        self.rest.insert(stage.as_str().to_string(), value);
        Ok(())
    }

    /// Remove a stage record. Returns true when one was present.
    pub fn clear_stage_record(&mut self, stage: &StageName) -> bool {
        self.rest.remove(stage.as_str()).is_some()
    }

    pub fn grant_lease(&mut self, owner: impl Into<String>, expires_at_ms: u64) {
        self.owner_id = Some(owner.into());
        self.lease_expires_at = Some(expires_at_ms);
    }

    pub fn clear_lease(&mut self) {
        self.owner_id = None;
        self.lease_expires_at = None;
    }

    /// A lease is expired when absent or not in the future.
    pub fn lease_expired(&self, now_ms: u64) -> bool {
        match self.lease_expires_at {
            Some(expires_at) => expires_at <= now_ms,
            None => true,
        }
    }

    /// True when every stage of `pipeline` is recorded COMPLETE; with
    /// the job in `DONE`, that makes its state terminal.
    pub fn pipeline_complete(&self, pipeline: &Pipeline) -> bool {
        pipeline
            .stages()
            .iter()
            .all(|s| self.stage_status(&s.name) == StageStatus::Complete)
    }

    /// Unrecognized top-level fields (and stage records), as stored.
    pub fn extra_fields(&self) -> &Map<String, Value> {
        &self.rest
    }
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod tests;
