// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-backed stage processor.
//!
//! Runs a configured argv with the job's context in the environment and
//! the scratch directory as its working directory. Files the command
//! leaves in the scratch directory become the stage's artifacts.
//!
//! Exit 0 is success; any other exit is a classified work failure. Only
//! spawn/readback trouble is transport-level (retryable).

use crate::processor::{
    Artifact, StageIoError, StageOutcome, StageProcessor, StageRequest, StageSuccess,
};
use async_trait::async_trait;
use std::io;
use tokio::process::Command;
use tracing::debug;

/// How much stderr to keep in the failure message.
const STDERR_TAIL_BYTES: usize = 4096;

#[derive(Debug)]
pub struct CommandProcessor {
    argv: Vec<String>,
    provider: String,
}

impl CommandProcessor {
    /// `argv[0]` is the program; the rest are fixed arguments.
    pub fn new(argv: Vec<String>) -> Result<Self, io::Error> {
        let program = argv
            .first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        let provider = program
            .rsplit('/')
            .next()
            .unwrap_or(program.as_str())
            .to_string();
        Ok(Self { argv, provider })
    }
}

#[async_trait]
impl StageProcessor for CommandProcessor {
    async fn run(&self, req: StageRequest<'_>) -> Result<StageOutcome, StageIoError> {
        let input = serde_json::to_string(&req.metadata.input).unwrap_or_default();
        let output = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .current_dir(req.workdir)
            .env("SF_JOB_ID", req.job_id.as_str())
            .env("SF_STAGE", req.stage.as_str())
            .env("SF_WORKDIR", req.workdir)
            .env("SF_INPUT", input)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let tail = stderr
                .get(tail_start..)
                .unwrap_or(&stderr)
                .trim()
                .to_string();
            return Ok(StageOutcome::failure(format!("exit_{}", code), tail));
        }

        let artifacts = collect_artifacts(req.workdir)?;
        debug!(
            job_id = %req.job_id,
            stage = %req.stage,
            provider = %self.provider,
            artifacts = artifacts.len(),
            "command stage succeeded"
        );
        Ok(StageOutcome::Success(StageSuccess {
            provider: Some(self.provider.clone()),
            artifacts,
            extra: serde_json::Map::new(),
        }))
    }
}

fn collect_artifacts(workdir: &std::path::Path) -> Result<Vec<Artifact>, StageIoError> {
    let mut artifacts = Vec::new();
    for entry in std::fs::read_dir(workdir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let bytes = std::fs::read(entry.path())?;
        artifacts.push(Artifact { name, bytes });
    }
    artifacts.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(artifacts)
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
