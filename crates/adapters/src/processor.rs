// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The stage-processor contract.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sf_core::{JobId, StageName};
use sf_storage::JobMetadata;
use std::path::Path;
use thiserror::Error;

/// Everything a processor gets for one invocation.
///
/// `workdir` is a scratch directory private to this invocation; it is
/// discarded afterwards. Durable output goes back as [`Artifact`]s and
/// is written into the job folder by the worker skeleton.
pub struct StageRequest<'a> {
    pub job_id: &'a JobId,
    pub stage: &'a StageName,
    pub metadata: &'a JobMetadata,
    pub workdir: &'a Path,
}

/// A named output file produced by a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// A successful stage result.
#[derive(Debug, Clone, Default)]
pub struct StageSuccess {
    /// External collaborator that produced the result, if identifiable.
    pub provider: Option<String>,
    pub artifacts: Vec<Artifact>,
    /// Arbitrary stage-specific data merged into the stage record.
    pub extra: Map<String, Value>,
}

/// Classified result of running a stage's work.
///
/// `Failure` is a *work-content* failure: recorded in the stage record
/// and the job moves to `FAILED`. Transport-level trouble is the `Err`
/// channel of [`StageProcessor::run`] and is retried at the queue layer.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    Success(StageSuccess),
    Failure { reason: String, message: String },
}

impl StageOutcome {
    pub fn failure(reason: impl Into<String>, message: impl Into<String>) -> Self {
        StageOutcome::Failure {
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// A transient I/O failure; eligible for retry.
#[derive(Debug, Error)]
#[error("transient stage I/O failure: {0}")]
pub struct StageIoError(#[from] pub std::io::Error);

/// One pipeline stage's processing content.
#[async_trait]
pub trait StageProcessor: Send + Sync + std::fmt::Debug {
    async fn run(&self, req: StageRequest<'_>) -> Result<StageOutcome, StageIoError>;
}
