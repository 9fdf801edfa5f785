use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::ArtifactLayout;
use crate::files::{UpdateError, UpdateOutcome};
use crate::generate::{ArtifactKind, GenerationError};
use crate::store::StoreError;

/// What happened to one artifact during an apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: UpdateOutcome,
}

/// Record of one apply run. Built fresh per run and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub paths: ArtifactLayout,
    pub artifacts: Vec<ArtifactReport>,
    pub validation_ok: bool,
    pub validation_log: String,
    pub restart_ok: bool,
    pub restart_log: String,
    pub restart_skipped: bool,
}

impl ApplyResult {
    pub(crate) fn new(run_id: Uuid, paths: ArtifactLayout) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            paths,
            artifacts: Vec::with_capacity(ArtifactKind::ALL.len()),
            validation_ok: false,
            validation_log: String::new(),
            restart_ok: false,
            restart_log: String::new(),
            restart_skipped: false,
        }
    }

    /// Number of artifacts whose bytes changed on disk.
    pub fn changed_count(&self) -> usize {
        self.artifacts.iter().filter(|a| a.outcome.changed()).count()
    }

    /// Backups written during this run.
    pub fn backups(&self) -> Vec<&PathBuf> {
        self.artifacts
            .iter()
            .filter_map(|a| match &a.outcome {
                UpdateOutcome::Replaced { backup } => backup.as_ref(),
                _ => None,
            })
            .collect()
    }
}

/// Pipeline stage, used to report where an aborted run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPhase {
    Snapshotting,
    Generating,
    Writing,
    Validating,
    Restarting,
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApplyPhase::Snapshotting => "snapshotting",
            ApplyPhase::Generating => "generating",
            ApplyPhase::Writing => "writing",
            ApplyPhase::Validating => "validating",
            ApplyPhase::Restarting => "restarting",
        };
        f.write_str(name)
    }
}

/// Terminal state of an apply run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApplyStatus {
    Applied,
    ValidationFailed,
    RestartFailed,
    Aborted { phase: ApplyPhase },
}

impl ApplyStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ApplyStatus::Applied => "applied",
            ApplyStatus::ValidationFailed => "validation_failed",
            ApplyStatus::RestartFailed => "restart_failed",
            ApplyStatus::Aborted { .. } => "aborted",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to load snapshot: {0}")]
    Snapshot(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("failed to prepare policy directory: {0}")]
    PolicyDir(#[source] UpdateError),

    #[error("failed to write {kind} artifact: {source}")]
    Write {
        kind: ArtifactKind,
        #[source]
        source: UpdateError,
    },

    #[error("engine rejected the generated policy")]
    ValidationFailed { result: Box<ApplyResult> },

    #[error("engine restart failed after successful validation")]
    RestartFailed { result: Box<ApplyResult> },
}

impl ApplyError {
    /// The populated result, for failures that happen after the writes.
    pub fn result(&self) -> Option<&ApplyResult> {
        match self {
            ApplyError::ValidationFailed { result } | ApplyError::RestartFailed { result } => {
                Some(&**result)
            }
            _ => None,
        }
    }

    /// Valid configuration on disk but the engine may be down.
    pub fn is_critical(&self) -> bool {
        matches!(self, ApplyError::RestartFailed { .. })
    }

    pub fn status(&self) -> ApplyStatus {
        match self {
            ApplyError::Snapshot(_) => ApplyStatus::Aborted {
                phase: ApplyPhase::Snapshotting,
            },
            ApplyError::Generation(_) => ApplyStatus::Aborted {
                phase: ApplyPhase::Generating,
            },
            ApplyError::PolicyDir(_) | ApplyError::Write { .. } => ApplyStatus::Aborted {
                phase: ApplyPhase::Writing,
            },
            ApplyError::ValidationFailed { .. } => ApplyStatus::ValidationFailed,
            ApplyError::RestartFailed { .. } => ApplyStatus::RestartFailed,
        }
    }
}
