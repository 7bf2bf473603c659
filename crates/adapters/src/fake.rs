// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted fake processor for tests.

use crate::processor::{
    Artifact, StageIoError, StageOutcome, StageProcessor, StageRequest, StageSuccess,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sf_core::{JobId, StageName};
use std::collections::VecDeque;
use std::io;

#[derive(Debug)]
enum Scripted {
    Outcome(StageOutcome),
    IoError(String),
}

/// A [`StageProcessor`] that replays scripted results.
///
/// With an empty script every invocation succeeds with a single
/// `out.dat` artifact, so the happy path needs no setup. Scripted
/// results are consumed front-to-back.
#[derive(Default, Debug)]
pub struct FakeProcessor {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(JobId, StageName)>>,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a success with the given artifacts.
    pub fn push_success(&self, artifacts: Vec<(&str, &[u8])>) {
        let success = StageSuccess {
            provider: Some("fake".to_string()),
            artifacts: artifacts
                .into_iter()
                .map(|(name, bytes)| Artifact {
                    name: name.to_string(),
                    bytes: bytes.to_vec(),
                })
                .collect(),
            extra: serde_json::Map::new(),
        };
        self.script
            .lock()
            .push_back(Scripted::Outcome(StageOutcome::Success(success)));
    }

    /// Queue a classified work failure.
    pub fn push_failure(&self, reason: &str, message: &str) {
        self.script
            .lock()
            .push_back(Scripted::Outcome(StageOutcome::failure(reason, message)));
    }

    /// Queue a transient I/O error (retryable at the queue layer).
    pub fn push_io_error(&self, message: &str) {
        self.script
            .lock()
            .push_back(Scripted::IoError(message.to_string()));
    }

    /// Every `(job, stage)` pair this processor was invoked with.
    pub fn calls(&self) -> Vec<(JobId, StageName)> {
        self.calls.lock().clone()
    }

    fn default_success() -> StageOutcome {
        StageOutcome::Success(StageSuccess {
            provider: Some("fake".to_string()),
            artifacts: vec![Artifact {
                name: "out.dat".to_string(),
                bytes: b"fake output".to_vec(),
            }],
            extra: serde_json::Map::new(),
        })
    }
}

#[async_trait]
impl StageProcessor for FakeProcessor {
    async fn run(&self, req: StageRequest<'_>) -> Result<StageOutcome, StageIoError> {
        self.calls
            .lock()
            .push((req.job_id.clone(), req.stage.clone()));
        match self.script.lock().pop_front() {
            Some(Scripted::Outcome(outcome)) => Ok(outcome),
            Some(Scripted::IoError(message)) => Err(StageIoError(io::Error::other(message))),
            None => Ok(Self::default_success()),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
