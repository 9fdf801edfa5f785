//! Daemon startup and main loop.
//!
//! # Responsibilities
//! - Build the store, engine and reconciler from configuration
//! - Start background tasks (metrics endpoint, warmup scheduler, state watcher)
//! - Turn watch events and SIGHUP into applies until shutdown
//!
//! # Design Decisions
//! - Fail fast: a bad metrics address or an unwatchable state file is fatal
//! - Bursts of watch events are coalesced into one check
//! - A watch event only triggers an apply when rendered output would change

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{ReconcilerConfig, StateWatcher};
use crate::engine::SystemEngine;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::reconcile::Reconciler;
use crate::store::{ConfigStore, StateFile};
use crate::warmup::WarmupScheduler;

/// Quiet period after a watch event before the state file is re-read.
const WATCH_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid metrics address {address:?}: {source}")]
    MetricsAddress {
        address: String,
        #[source]
        source: std::net::AddrParseError,
    },

    #[error("failed to start metrics endpoint: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("failed to watch state file: {0}")]
    Watch(#[from] notify::Error),
}

/// Long-running reconciler service.
pub struct Daemon {
    config: Arc<ReconcilerConfig>,
    store: Arc<dyn ConfigStore>,
    reconciler: Arc<Reconciler>,
    shutdown: Shutdown,
}

impl Daemon {
    /// Wire the production store and engine.
    pub fn from_config(config: Arc<ReconcilerConfig>) -> Result<Self, StartupError> {
        if config.observability.metrics_enabled {
            let address = &config.observability.metrics_address;
            let addr: SocketAddr =
                address
                    .parse()
                    .map_err(|source| StartupError::MetricsAddress {
                        address: address.clone(),
                        source,
                    })?;
            metrics::init_metrics(addr)?;
        }

        let store: Arc<dyn ConfigStore> = Arc::new(StateFile::new(&config.store.state_file));
        let engine = Arc::new(SystemEngine::new(config.engine.clone()));
        let reconciler = Arc::new(Reconciler::new(config.clone(), store.clone(), engine));
        Ok(Self::new(config, store, reconciler))
    }

    pub fn new(
        config: Arc<ReconcilerConfig>,
        store: Arc<dyn ConfigStore>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            config,
            store,
            reconciler,
            shutdown: Shutdown::new(),
        }
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run until SIGTERM/SIGINT or until the shutdown handle is triggered.
    pub async fn run(self) -> Result<(), StartupError> {
        let (apply_tx, mut apply_rx) = mpsc::unbounded_channel();
        let mut shutdown_rx = self.shutdown.subscribe();

        let signal_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = signals::handle_signals(signal_shutdown, apply_tx).await {
                tracing::error!(error = %e, "Failed to install signal handlers");
            }
        });

        // The watcher stops when dropped, so it lives as long as this loop.
        let mut watch_rx = None;
        let _watcher = if self.config.store.watch {
            let (watcher, rx) = StateWatcher::new(&self.config.store.state_file);
            watch_rx = Some(rx);
            Some(watcher.run()?)
        } else {
            None
        };

        if self.config.store.apply_on_start {
            apply_logged(&self.reconciler, "startup").await;
        }

        let scheduler = self.config.warmup.enabled.then(|| {
            let scheduler = WarmupScheduler::new(
                self.store.clone(),
                self.reconciler.clone(),
                &self.config.warmup,
            );
            tokio::spawn(scheduler.run(self.shutdown.subscribe()))
        });

        tracing::info!(
            state_file = ?self.config.store.state_file,
            policy_dir = ?self.config.paths.policy_dir,
            "Reconciler daemon running"
        );

        loop {
            tokio::select! {
                Some(()) = next_event(&mut watch_rx) => {
                    tokio::time::sleep(WATCH_SETTLE).await;
                    if let Some(rx) = watch_rx.as_mut() {
                        while rx.try_recv().is_ok() {}
                    }
                    self.apply_if_changed().await;
                }
                Some(()) = apply_rx.recv() => {
                    apply_logged(&self.reconciler, "signal").await;
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        self.shutdown.trigger();
        if let Some(handle) = scheduler {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Warmup scheduler task failed");
            }
        }
        tracing::info!("Shutdown complete");
        Ok(())
    }

    async fn apply_if_changed(&self) {
        match self.reconciler.pending_changes() {
            Ok(kinds) if kinds.is_empty() => {
                tracing::debug!("State changed but generated output is identical, skipping apply")
            }
            Ok(kinds) => {
                tracing::info!(artifacts = ?kinds, "State change affects generated output");
                apply_logged(&self.reconciler, "state change").await;
            }
            Err(e) => tracing::warn!(error = %e, "Cannot render after state change"),
        }
    }
}

async fn next_event(rx: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Apply and log the outcome; the reconciler already records details.
async fn apply_logged(reconciler: &Reconciler, reason: &'static str) {
    match reconciler.apply().await {
        Ok(result) => tracing::info!(
            reason = reason,
            run_id = %result.run_id,
            changed = result.changed_count(),
            "Apply complete"
        ),
        Err(e) => tracing::warn!(reason = reason, status = e.status().label(), "Apply did not complete"),
    }
}
