//! Run results and the aggregated report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::domain::combination::VersionCombination;
use crate::error::{ErrorKind, PipelineError};

/// Pipeline stage a test case was trying to reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SourceUploaded,
    BuildContainerReady,
    BuildComplete,
    ArtifactStaged,
    RuntimeContainerReady,
    Verified,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::SourceUploaded => "upload",
            Stage::BuildContainerReady => "build container",
            Stage::BuildComplete => "build",
            Stage::ArtifactStaged => "transfer",
            Stage::RuntimeContainerReady => "deploy",
            Stage::Verified => "verify",
        };
        f.write_str(s)
    }
}

/// Why a case failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome of one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed(Failure),
    /// Not executed because an earlier case failed under fail-fast
    Skipped,
}

/// Result of executing one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub combination: VersionCombination,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

impl RunResult {
    pub fn passed(
        combination: VersionCombination,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            combination,
            outcome: Outcome::Passed,
            started_at,
            elapsed,
        }
    }

    pub fn failed(
        combination: VersionCombination,
        stage: Stage,
        error: &PipelineError,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            combination,
            outcome: Outcome::Failed(Failure {
                stage,
                kind: error.kind(),
                message: error.to_string(),
            }),
            started_at,
            elapsed,
        }
    }

    pub fn skipped(combination: VersionCombination) -> Self {
        Self {
            combination,
            outcome: Outcome::Skipped,
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Passed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Aggregated results of a matrix run, in declared case order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub run_id: String,
    pub results: Vec<RunResult>,
}

impl Report {
    pub fn new(run_id: impl Into<String>, results: Vec<RunResult>) -> Self {
        Self {
            run_id: run_id.into(),
            results,
        }
    }

    /// True when no case failed
    pub fn passed(&self) -> bool {
        !self.results.iter().any(RunResult::is_failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Skipped))
            .count()
    }

    /// Process exit code for this report
    pub fn exit_code(&self) -> i32 {
        if self.passed() { 0 } else { 1 }
    }
}
