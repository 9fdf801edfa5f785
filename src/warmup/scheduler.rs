use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::WarmupConfig;
use crate::observability::metrics;
use crate::reconcile::{ApplyError, ApplyResult, Reconciler};
use crate::store::{ConfigStore, StoreError};
use crate::warmup::{advance, WarmupStep};

#[derive(Debug, Error)]
pub enum WarmupError {
    #[error("failed to load snapshot: {0}")]
    Snapshot(#[from] StoreError),

    #[error("apply after warmup changes failed: {0}")]
    Apply(#[from] ApplyError),
}

/// One sender that moved during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WarmupTransition {
    pub sender_id: u64,
    pub email: String,
    pub step: &'static str,
    pub day: u32,
    pub rate: Option<&'static str>,
}

/// Summary of one scheduler pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WarmupReport {
    /// Warmup-enabled senders looked at.
    pub evaluated: usize,
    pub transitions: Vec<WarmupTransition>,
    /// Senders whose new state could not be saved.
    pub save_failures: usize,
    /// At least one effective rate limit moved.
    pub rate_changed: bool,
    /// Present when a rate changed and the reconciler ran.
    pub apply: Option<ApplyResult>,
}

/// Advances sender warmup once per interval and re-applies on rate changes.
pub struct WarmupScheduler {
    store: Arc<dyn ConfigStore>,
    reconciler: Arc<Reconciler>,
    interval: Duration,
    advance_after: chrono::Duration,
}

impl WarmupScheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        reconciler: Arc<Reconciler>,
        config: &WarmupConfig,
    ) -> Self {
        let advance_after_secs = i64::try_from(config.advance_after_secs).unwrap_or(i64::MAX);
        Self {
            store,
            reconciler,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            advance_after: chrono::Duration::try_seconds(advance_after_secs)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Evaluate every sender at `now`, persist changes, and apply once if any
    /// rate limit moved.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<WarmupReport, WarmupError> {
        let snapshot = self.store.load_snapshot()?;
        snapshot.check_sender_ids()?;
        let mut report = WarmupReport::default();

        for (_, sender) in snapshot.identities() {
            if !sender.warmup.enabled {
                continue;
            }
            report.evaluated += 1;

            let step = advance(&sender.warmup, now, self.advance_after);
            let Some(state) = step.new_state() else {
                continue;
            };

            if let Err(e) = self.store.save_warmup(sender.id, state) {
                tracing::warn!(sender = %sender.email, error = %e, "Failed to save warmup state");
                report.save_failures += 1;
                continue;
            }

            metrics::record_warmup_transition(step.label());
            match &step {
                WarmupStep::Advanced { state, rate } => {
                    tracing::info!(sender = %sender.email, day = state.day, rate = %rate, "Warmup advanced")
                }
                WarmupStep::Completed(_) => {
                    tracing::info!(sender = %sender.email, "Warmup complete, rate now unlimited")
                }
                _ => tracing::debug!(sender = %sender.email, step = step.label(), "Warmup clock started"),
            }

            report.rate_changed |= step.changes_rate();
            report.transitions.push(WarmupTransition {
                sender_id: sender.id,
                email: sender.email.clone(),
                step: step.label(),
                day: state.day,
                rate: state.current_rate(),
            });
        }

        if report.rate_changed {
            report.apply = Some(self.reconciler.apply().await?);
        }
        Ok(report)
    }

    /// Tick on the configured interval until shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(interval = ?self.interval, "Warmup scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once(Utc::now()).await {
                        Ok(report) => tracing::info!(
                            evaluated = report.evaluated,
                            transitions = report.transitions.len(),
                            applied = report.apply.is_some(),
                            "Warmup pass complete"
                        ),
                        Err(e) => tracing::error!(error = %e, "Warmup pass failed"),
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Warmup scheduler stopping");
                    break;
                }
            }
        }
    }
}
