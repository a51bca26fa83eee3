// wheelhouse-common/src/pipeline.rs
//! Shared vocabulary between the pipeline runner and its observers.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::model::Artifact;

/// Stages of one mirror build, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Acquire,
    Consolidate,
    Index,
    Publish,
    Verify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Consolidate => "consolidate",
            Stage::Index => "index",
            Stage::Publish => "publish",
            Stage::Verify => "verify",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one (requirement × platform target) acquisition task.
/// The absence of a compatible wheel is a normal outcome, not an error.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(Artifact),
    NoMatchingWheel {
        requirement: String,
        target: &'static str,
    },
    Failed {
        requirement: String,
        target: &'static str,
        error: Error,
    },
}

/// Per-target acquisition counts. Observability only; control flow never
/// branches on these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSummary {
    pub target: String,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Of `failed`, how many were a clean "no compatible wheel" outcome
    /// rather than a download or upstream error.
    pub no_match: usize,
}

impl TargetSummary {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, outcome: &FetchOutcome) {
        self.attempted += 1;
        match outcome {
            FetchOutcome::Fetched(_) => self.succeeded += 1,
            FetchOutcome::NoMatchingWheel { .. } => {
                self.failed += 1;
                self.no_match += 1;
            }
            FetchOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Events broadcast while a pipeline run progresses. The CLI status task
/// renders these; nothing in the pipeline depends on them being consumed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    PipelineStarted {
        requirements: usize,
        targets: usize,
        total_tasks: usize,
    },
    StageStarted {
        stage: Stage,
    },
    DownloadStarted {
        filename: String,
        target: String,
        size_bytes: Option<u64>,
    },
    ArtifactStaged {
        filename: String,
        target: String,
    },
    NoMatchingWheel {
        requirement: String,
        target: String,
    },
    AcquireFailed {
        requirement: String,
        target: String,
        error: String,
    },
    TargetFinished {
        summary: TargetSummary,
    },
    PoolConsolidated {
        pooled: usize,
        duplicates: usize,
        absorbed: usize,
    },
    IndexWritten {
        packages: usize,
        artifacts: usize,
    },
    BlobsSynced {
        uploaded: usize,
        skipped: usize,
    },
    IndexSynced {
        uploaded: usize,
        deleted: usize,
    },
    Warning {
        message: String,
    },
    VerifyFinished {
        satisfied: usize,
        unsatisfied: usize,
    },
    PipelineFinished {
        succeeded: usize,
        failed: usize,
        unsatisfied: usize,
    },
}
