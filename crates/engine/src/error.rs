// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the engine runtime.

use sf_core::{ConfigError, InvalidJobId, JobId, JobState, StageName};
use sf_storage::{IndexError, LayoutError, MoveError, StoreError};
use thiserror::Error;

/// Errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Move(#[from] MoveError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    InvalidJobId(#[from] InvalidJobId),
    #[error("unknown stage: {0}")]
    UnknownStage(StageName),
    #[error("no processor configured for stage: {0}")]
    MissingProcessor(StageName),
    #[error("job {id} is {state}, retry requires FAILED")]
    RetryNotFailed { id: JobId, state: JobState },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
