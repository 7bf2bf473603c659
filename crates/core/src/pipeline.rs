// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The fixed, ordered sequence of processing stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Opaque label for one pipeline stage.
///
/// Stage names double as directory names under a job folder (artifact
/// namespaces) and as metadata keys, so they are validated for path
/// safety on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StageName(String);

/// A stage name that cannot be used as a directory or metadata key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid stage name {0:?}: must be non-empty [a-z0-9_-]")]
pub struct InvalidStageName(pub String);

impl StageName {
    pub fn parse(name: impl Into<String>) -> Result<Self, InvalidStageName> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
        if valid {
            Ok(Self(name))
        } else {
            Err(InvalidStageName(name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Construct from a literal the crate itself knows to be valid.
    pub(crate) fn known(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StageName {
    type Error = InvalidStageName;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        StageName::parse(s)
    }
}

impl From<StageName> for String {
    fn from(s: StageName) -> String {
        s.0
    }
}

impl PartialEq<str> for StageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

/// Execution parameters for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageDef {
    pub name: StageName,
    /// Hard ceiling on jobs this stage processes in parallel.
    pub concurrency: u32,
    /// How long a claim is honored before the reclaimer may take it back.
    pub lease: Duration,
    /// Wall-clock bound on one processor invocation.
    pub timeout: Duration,
    /// Transient-error retries before the stage is recorded as failed.
    pub retries: u32,
    /// Delay between retries (multiplied by the attempt number).
    pub backoff: Duration,
}

/// An ordered, non-empty stage sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<StageDef>,
}

/// Errors building a pipeline from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("pipeline has no stages")]
    Empty,
    #[error("duplicate stage name: {0}")]
    DuplicateStage(StageName),
    #[error("stage {0} has concurrency 0")]
    ZeroConcurrency(StageName),
}

impl Pipeline {
    pub fn new(stages: Vec<StageDef>) -> Result<Self, PipelineError> {
        if stages.is_empty() {
            return Err(PipelineError::Empty);
        }
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].iter().any(|s| s.name == stage.name) {
                return Err(PipelineError::DuplicateStage(stage.name.clone()));
            }
            if stage.concurrency == 0 {
                return Err(PipelineError::ZeroConcurrency(stage.name.clone()));
            }
        }
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    pub fn first(&self) -> &StageDef {
        &self.stages[0]
    }

    pub fn get(&self, name: &StageName) -> Option<&StageDef> {
        self.stages.iter().find(|s| &s.name == name)
    }

    /// Zero-based position of a stage in pipeline order.
    pub fn position(&self, name: &StageName) -> Option<usize> {
        self.stages.iter().position(|s| &s.name == name)
    }

    /// The stage that runs after `name`, if any.
    pub fn next_after(&self, name: &StageName) -> Option<&StageDef> {
        let pos = self.position(name)?;
        self.stages.get(pos + 1)
    }

    /// The stage that must be complete before `name` may run.
    pub fn prerequisite(&self, name: &StageName) -> Option<&StageDef> {
        let pos = self.position(name)?;
        pos.checked_sub(1).and_then(|p| self.stages.get(p))
    }

    pub fn is_first(&self, name: &StageName) -> bool {
        self.position(name) == Some(0)
    }

    pub fn is_last(&self, name: &StageName) -> bool {
        self.position(name) == Some(self.stages.len() - 1)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
