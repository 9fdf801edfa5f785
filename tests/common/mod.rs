//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use relay_reconciler::config::ReconcilerConfig;
use relay_reconciler::engine::{CommandOutcome, EngineControl, EngineError};
use relay_reconciler::store::{Domain, MemoryStore, Sender, Settings};
use relay_reconciler::warmup::{WarmupPlan, WarmupState};
use relay_reconciler::Reconciler;

/// Engine double with call counters and scripted outcomes.
#[derive(Default)]
pub struct FakeEngine {
    pub validate_calls: AtomicU32,
    pub restart_calls: AtomicU32,
    pub fail_validation: AtomicBool,
    pub fail_restart: AtomicBool,
    pub spawn_error: AtomicBool,
    delay: Mutex<Option<Duration>>,
    running: AtomicU32,
    pub max_concurrent: AtomicU32,
    pub validated: Mutex<Vec<PathBuf>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        let engine = Self::default();
        *engine.delay.lock().unwrap() = Some(delay);
        Arc::new(engine)
    }

    pub fn validations(&self) -> u32 {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn restarts(&self) -> u32 {
        self.restart_calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_concurrent.fetch_max(now, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl EngineControl for FakeEngine {
    async fn validate(&self, policy: &Path) -> Result<CommandOutcome, EngineError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        self.validated.lock().unwrap().push(policy.to_path_buf());
        self.enter().await;

        if self.spawn_error.load(Ordering::SeqCst) {
            return Err(EngineError::Spawn {
                program: "kumod".into(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            });
        }
        if self.fail_validation.load(Ordering::SeqCst) {
            Ok(CommandOutcome::failure("init.lua:12: syntax error"))
        } else {
            Ok(CommandOutcome::success("policy ok"))
        }
    }

    async fn restart(&self) -> Result<CommandOutcome, EngineError> {
        self.restart_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;

        if self.fail_restart.load(Ordering::SeqCst) {
            Ok(CommandOutcome::failure("Job for kumomta.service failed"))
        } else {
            Ok(CommandOutcome::success(""))
        }
    }
}

/// Configuration pointing every path into a fresh temp directory.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: Arc<ReconcilerConfig>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with(|_| {})
    }

    pub fn with(adjust: impl FnOnce(&mut ReconcilerConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ReconcilerConfig::default();
        config.paths.policy_dir = dir.path().join("policy");
        config.paths.dkim_dir = dir.path().join("dkim");
        config.store.state_file = dir.path().join("state.toml");
        adjust(&mut config);
        Self {
            dir,
            config: Arc::new(config),
        }
    }

    pub fn policy_dir(&self) -> &Path {
        &self.config.paths.policy_dir
    }

    pub fn reconciler(&self, store: Arc<MemoryStore>, engine: Arc<FakeEngine>) -> Reconciler {
        Reconciler::new(self.config.clone(), store, engine)
    }

    /// Every `.bak` file in the policy directory.
    pub fn backups(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.policy_dir()) else {
            return Vec::new();
        };
        let mut backups: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "bak"))
            .collect();
        backups.sort();
        backups
    }
}

pub fn sender(id: u64, domain: &Domain, local: &str, ip: &str) -> Sender {
    Sender {
        id,
        domain_id: domain.id,
        local_part: local.into(),
        email: format!("{local}@{}", domain.name),
        ip: ip.into(),
        warmup: WarmupState::default(),
    }
}

/// acme.io with `info@acme.io` on 192.0.2.10, standard warmup day 3.
pub fn acme_domain() -> Domain {
    let mut acme = Domain {
        id: 1,
        name: "acme.io".into(),
        mail_host: "mail.acme.io".into(),
        ..Default::default()
    };
    let mut info = sender(1, &acme, "info", "192.0.2.10");
    info.warmup = WarmupState {
        enabled: true,
        plan: WarmupPlan::Standard,
        day: 3,
        last_update: None,
    };
    acme.senders.push(info);
    acme
}

pub fn settings() -> Settings {
    Settings {
        main_hostname: "mta.acme.io".into(),
        relay_ips: vec!["198.51.100.7".into()],
        ..Default::default()
    }
}

pub fn acme_store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_data(Some(settings()), vec![acme_domain()]))
}
