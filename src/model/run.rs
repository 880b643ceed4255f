//! Processing run envelope
//!
//! Run states: IN_PROGRESS → {COMPLETED | FAILED}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{monotonic_now, Metadata};

/// Run state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run is active
    InProgress,
    /// Run finished successfully
    Completed,
    /// Run failed
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    /// Check if a state is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Check if transition from this state to target is valid
    pub fn can_transition_to(&self, target: RunStatus) -> bool {
        matches!(
            (self, target),
            (RunStatus::InProgress, RunStatus::Completed)
                | (RunStatus::InProgress, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors for run lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Invalid run transition from {from} to {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
}

/// Groups a sequence of artifact operations under one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRun {
    pub run_id: String,

    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub status: RunStatus,

    /// Artifacts registered as inputs to this run
    #[serde(rename = "input_artifacts", default)]
    pub input_artifact_ids: Vec<String>,

    /// Artifacts created while this run was current
    #[serde(rename = "output_artifacts", default)]
    pub output_artifact_ids: Vec<String>,

    /// Caller-supplied options snapshot
    #[serde(default)]
    pub configuration: Metadata,

    #[serde(default)]
    pub error_messages: Vec<String>,
}

impl ProcessingRun {
    /// Create a new run in IN_PROGRESS state
    pub fn new(configuration: Metadata) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::InProgress,
            input_artifact_ids: Vec::new(),
            output_artifact_ids: Vec::new(),
            configuration,
            error_messages: Vec::new(),
        }
    }

    /// Finalize the run with a terminal status.
    pub fn complete(&mut self, status: RunStatus) -> Result<(), RunError> {
        if !self.status.can_transition_to(status) {
            return Err(RunError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.status = status;
        self.completed_at = Some(monotonic_now(self.started_at));
        Ok(())
    }

    /// Elapsed time between start and completion, once finalized.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}
