use std::fs;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ReconcilerConfig;
use crate::engine::{CommandOutcome, EngineControl, EngineError};
use crate::files;
use crate::generate::{self, Artifact, ArtifactKind};
use crate::observability::metrics;
use crate::reconcile::{ApplyError, ApplyPhase, ApplyResult, ApplyStatus, ArtifactReport};
use crate::store::ConfigStore;

/// The external engine as a singleton resource. Holding the lock means owning
/// the target files and the service for the whole run.
struct ManagedEngine {
    control: Arc<dyn EngineControl>,

    /// The engine is known to run the files currently on disk.
    in_sync: bool,
}

/// Drives snapshot → generate → write → validate → restart.
pub struct Reconciler {
    config: Arc<ReconcilerConfig>,
    store: Arc<dyn ConfigStore>,
    engine: Mutex<ManagedEngine>,
    last_status: RwLock<Option<ApplyStatus>>,
}

impl Reconciler {
    pub fn new(
        config: Arc<ReconcilerConfig>,
        store: Arc<dyn ConfigStore>,
        engine: Arc<dyn EngineControl>,
    ) -> Self {
        Self {
            config,
            store,
            engine: Mutex::new(ManagedEngine {
                control: engine,
                in_sync: false,
            }),
            last_status: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Terminal state of the most recent run, `None` before the first.
    pub fn last_status(&self) -> Option<ApplyStatus> {
        self.last_status.read().ok().and_then(|status| *status)
    }

    /// Render every artifact for the current snapshot without touching disk.
    pub fn preview(&self) -> Result<Vec<Artifact>, ApplyError> {
        let snapshot = self.store.load_snapshot()?;
        Ok(generate::render_all(&snapshot, &self.config)?)
    }

    /// Artifacts whose rendered bytes differ from the files on disk.
    pub fn pending_changes(&self) -> Result<Vec<ArtifactKind>, ApplyError> {
        Ok(self
            .preview()?
            .into_iter()
            .filter(|a| fs::read(&a.path).map_or(true, |bytes| bytes != a.content.as_bytes()))
            .map(|a| a.kind)
            .collect())
    }

    /// Run the full pipeline once. Concurrent callers queue behind each other;
    /// once started a run always completes.
    pub async fn apply(&self) -> Result<ApplyResult, ApplyError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("apply", run_id = %run_id);

        async {
            let started = Instant::now();
            let mut engine = self.engine.lock().await;
            tracing::info!("Apply started");

            let outcome = self.run(run_id, &engine).await;
            let status = match &outcome {
                Ok(_) => ApplyStatus::Applied,
                Err(e) => e.status(),
            };
            engine.in_sync = status == ApplyStatus::Applied;
            if let Ok(mut last) = self.last_status.write() {
                *last = Some(status);
            }
            metrics::record_apply(status.label(), started);

            match &outcome {
                Ok(result) => tracing::info!(
                    changed = result.changed_count(),
                    restart_skipped = result.restart_skipped,
                    elapsed = ?started.elapsed(),
                    "Apply finished"
                ),
                Err(e) if e.is_critical() => {
                    tracing::error!(error = %e, "Engine restart failed; service may be down")
                }
                Err(e) => tracing::warn!(error = %e, status = status.label(), "Apply failed"),
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        run_id: Uuid,
        engine: &ManagedEngine,
    ) -> Result<ApplyResult, ApplyError> {
        let layout = self.config.paths.layout();

        tracing::debug!(phase = %ApplyPhase::Snapshotting, "Loading snapshot");
        let snapshot = self.store.load_snapshot()?;

        tracing::debug!(
            phase = %ApplyPhase::Generating,
            domains = snapshot.domains.len(),
            senders = snapshot.sender_count(),
            "Rendering artifacts"
        );
        let artifacts = generate::render_all(&snapshot, &self.config)?;
        for path in generate::missing_signing_keys(&snapshot, &self.config.paths.dkim_dir) {
            tracing::warn!(path = ?path, "Signing key not found, sender will go out unsigned");
        }

        tracing::debug!(
            phase = %ApplyPhase::Writing,
            dir = ?self.config.paths.policy_dir,
            "Writing artifacts"
        );
        files::ensure_dir(&self.config.paths.policy_dir, self.config.paths.dir_mode)
            .map_err(ApplyError::PolicyDir)?;

        let mut result = ApplyResult::new(run_id, layout);
        for artifact in artifacts {
            let outcome = files::smart_update(
                &artifact.path,
                artifact.content.as_bytes(),
                self.config.paths.file_mode,
            );
            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(source) => {
                    metrics::record_artifact_write(artifact.kind.as_str(), "error");
                    return Err(ApplyError::Write {
                        kind: artifact.kind,
                        source,
                    });
                }
            };
            metrics::record_artifact_write(artifact.kind.as_str(), outcome.label());
            tracing::info!(
                kind = %artifact.kind,
                path = ?artifact.path,
                outcome = outcome.label(),
                "Artifact written"
            );
            result.artifacts.push(ArtifactReport {
                kind: artifact.kind,
                path: artifact.path,
                outcome,
            });
        }
        let unchanged = result.changed_count() == 0;

        tracing::info!(
            phase = %ApplyPhase::Validating,
            changed = result.changed_count(),
            "Validating policy"
        );

        let validation = outcome_or_failure(engine.control.validate(&result.paths.init_lua).await);
        result.validation_ok = validation.ok;
        result.validation_log = validation.log;
        if !result.validation_ok {
            tracing::warn!(log = %result.validation_log, "Policy validation failed, restart withheld");
            return Err(ApplyError::ValidationFailed {
                result: Box::new(result),
            });
        }

        if self.config.engine.skip_unchanged_restart && unchanged && engine.in_sync {
            tracing::info!("Nothing changed and engine is current; restart skipped");
            result.restart_ok = true;
            result.restart_skipped = true;
            return Ok(result);
        }

        tracing::info!(phase = %ApplyPhase::Restarting, "Validation passed, restarting engine");
        let restart = outcome_or_failure(engine.control.restart().await);
        result.restart_ok = restart.ok;
        result.restart_log = restart.log;
        if !result.restart_ok {
            return Err(ApplyError::RestartFailed {
                result: Box::new(result),
            });
        }
        Ok(result)
    }
}

/// A command that could not be run counts as a failed one.
fn outcome_or_failure(outcome: Result<CommandOutcome, EngineError>) -> CommandOutcome {
    outcome.unwrap_or_else(|e| CommandOutcome::failure(e.to_string()))
}
