//! End-to-end tests of the apply pipeline against a fake engine.

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use relay_reconciler::files::{backup_path, UpdateOutcome};
use relay_reconciler::generate::ArtifactKind;
use relay_reconciler::reconcile::{ApplyError, ApplyPhase, ApplyStatus};
use relay_reconciler::store::{Domain, MemoryStore};

mod common;

use common::{acme_domain, acme_store, sender, FakeEngine, TestEnv};

#[tokio::test]
async fn test_end_to_end_acme() {
    let env = TestEnv::new();
    let engine = FakeEngine::new();
    let reconciler = env.reconciler(acme_store(), engine.clone());

    let result = reconciler.apply().await.unwrap();
    assert!(result.validation_ok);
    assert!(result.restart_ok);
    assert_eq!(result.artifacts.len(), 5);
    assert!(result
        .artifacts
        .iter()
        .all(|a| a.outcome == UpdateOutcome::Created));

    let layout = env.config.paths.layout();
    let sources = fs::read_to_string(&layout.sources).unwrap();
    let queues = fs::read_to_string(&layout.queues).unwrap();
    let listener = fs::read_to_string(&layout.listener_domains).unwrap();
    let dkim = fs::read_to_string(&layout.dkim_data).unwrap();
    let policy = fs::read_to_string(&layout.init_lua).unwrap();

    assert!(sources.contains("[\"acme.io:info\"]"));
    assert!(sources.contains("source_address = \"192.0.2.10\""));
    assert!(queues.contains("[\"tenant:acme.io-info\"]"));
    assert!(queues.contains("egress_pool = \"acme.io-info\""));
    assert!(queues.contains("max_message_rate = \"100/hr\""));
    assert!(listener.contains("\"acme.io:info\""));
    assert!(dkim.contains("source = \"acme.io:info\""));
    assert!(dkim.contains("match_sender = \"info@acme.io\""));
    assert!(policy.contains("source = 'acme.io:info', pool = 'acme.io-info'"));

    assert_eq!(engine.validations(), 1);
    assert_eq!(engine.restarts(), 1);
    assert_eq!(
        engine.validated.lock().unwrap().as_slice(),
        &[layout.init_lua.clone()]
    );
    assert_eq!(reconciler.last_status(), Some(ApplyStatus::Applied));
}

#[tokio::test]
async fn test_second_apply_writes_nothing() {
    let env = TestEnv::new();
    let engine = FakeEngine::new();
    let reconciler = env.reconciler(acme_store(), engine.clone());

    reconciler.apply().await.unwrap();
    let layout = env.config.paths.layout();
    let before = fs::read(&layout.init_lua).unwrap();
    let mtime = fs::metadata(&layout.init_lua).unwrap().modified().unwrap();

    let second = reconciler.apply().await.unwrap();
    assert_eq!(second.changed_count(), 0);
    assert!(second.backups().is_empty());
    assert!(env.backups().is_empty());
    assert_eq!(fs::read(&layout.init_lua).unwrap(), before);
    assert_eq!(
        fs::metadata(&layout.init_lua).unwrap().modified().unwrap(),
        mtime
    );
    // Restart still follows every successful validation by default.
    assert!(!second.restart_skipped);
    assert_eq!(engine.restarts(), 2);
}

#[tokio::test]
async fn test_unchanged_restart_can_be_skipped() {
    let env = TestEnv::with(|c| c.engine.skip_unchanged_restart = true);
    let engine = FakeEngine::new();
    let reconciler = env.reconciler(acme_store(), engine.clone());

    reconciler.apply().await.unwrap();
    let second = reconciler.apply().await.unwrap();

    assert!(second.restart_skipped);
    assert!(second.restart_ok);
    assert_eq!(engine.validations(), 2);
    assert_eq!(engine.restarts(), 1);
}

#[tokio::test]
async fn test_skip_requires_previous_success() {
    let env = TestEnv::with(|c| c.engine.skip_unchanged_restart = true);
    let engine = FakeEngine::new();
    engine.fail_restart.store(true, Ordering::SeqCst);
    let reconciler = env.reconciler(acme_store(), engine.clone());

    assert!(reconciler.apply().await.is_err());
    engine.fail_restart.store(false, Ordering::SeqCst);

    let second = reconciler.apply().await.unwrap();
    assert!(!second.restart_skipped);
    assert_eq!(engine.restarts(), 2);
}

#[tokio::test]
async fn test_backup_only_for_changed_artifacts() {
    let env = TestEnv::new();
    let store = acme_store();
    let reconciler = env.reconciler(store.clone(), FakeEngine::new());
    reconciler.apply().await.unwrap();

    store
        .update_sender(1, |s| s.ip = "192.0.2.99".into())
        .unwrap();
    let result = reconciler.apply().await.unwrap();

    let layout = env.config.paths.layout();
    let changed: Vec<ArtifactKind> = result
        .artifacts
        .iter()
        .filter(|a| a.outcome.changed())
        .map(|a| a.kind)
        .collect();
    assert_eq!(changed, vec![ArtifactKind::Sources]);
    assert_eq!(env.backups(), vec![backup_path(&layout.sources)]);

    let backup = fs::read_to_string(backup_path(&layout.sources)).unwrap();
    assert!(backup.contains("192.0.2.10"));
    let current = fs::read_to_string(&layout.sources).unwrap();
    assert!(current.contains("192.0.2.99"));
}

#[tokio::test]
async fn test_removed_sender_disappears_everywhere() {
    let env = TestEnv::new();
    let store = acme_store();
    let mut acme = acme_domain();
    acme.senders.push(sender(2, &acme, "sales", "192.0.2.20"));
    store.upsert_domain(acme).unwrap();

    let reconciler = env.reconciler(store.clone(), FakeEngine::new());
    reconciler.apply().await.unwrap();
    let layout = env.config.paths.layout();
    assert!(fs::read_to_string(&layout.sources)
        .unwrap()
        .contains("acme.io:sales"));

    store.upsert_domain(acme_domain()).unwrap();
    reconciler.apply().await.unwrap();

    for path in [
        &layout.sources,
        &layout.queues,
        &layout.listener_domains,
        &layout.dkim_data,
        &layout.init_lua,
    ] {
        let content = fs::read_to_string(path).unwrap();
        assert!(!content.contains("sales"), "{} still mentions sales", path.display());
    }
}

#[tokio::test]
async fn test_validation_failure_blocks_restart() {
    let env = TestEnv::new();
    let engine = FakeEngine::new();
    engine.fail_validation.store(true, Ordering::SeqCst);
    let reconciler = env.reconciler(acme_store(), engine.clone());

    let err = reconciler.apply().await.unwrap_err();
    assert!(matches!(err, ApplyError::ValidationFailed { .. }));
    assert!(!err.is_critical());

    let result = err.result().unwrap();
    assert!(!result.validation_ok);
    assert!(!result.restart_ok);
    assert!(result.validation_log.contains("syntax error"));
    assert_eq!(engine.restarts(), 0);

    // The live policy is left in place for inspection.
    assert!(env.config.paths.layout().init_lua.exists());
    assert_eq!(reconciler.last_status(), Some(ApplyStatus::ValidationFailed));
}

#[tokio::test]
async fn test_validator_spawn_error_blocks_restart() {
    let env = TestEnv::new();
    let engine = FakeEngine::new();
    engine.spawn_error.store(true, Ordering::SeqCst);
    let reconciler = env.reconciler(acme_store(), engine.clone());

    let err = reconciler.apply().await.unwrap_err();
    let result = err.result().unwrap();
    assert!(!result.validation_ok);
    assert!(result.validation_log.contains("kumod"));
    assert_eq!(engine.restarts(), 0);
}

#[tokio::test]
async fn test_restart_failure_is_critical() {
    let env = TestEnv::new();
    let engine = FakeEngine::new();
    engine.fail_restart.store(true, Ordering::SeqCst);
    let reconciler = env.reconciler(acme_store(), engine.clone());

    let err = reconciler.apply().await.unwrap_err();
    assert!(err.is_critical());
    let result = err.result().unwrap();
    assert!(result.validation_ok);
    assert!(!result.restart_ok);
    assert!(result.restart_log.contains("failed"));
    assert_eq!(engine.restarts(), 1);
    assert_eq!(reconciler.last_status(), Some(ApplyStatus::RestartFailed));
}

#[tokio::test]
async fn test_invalid_snapshot_touches_nothing() {
    let env = TestEnv::new();
    let mut broken = Domain {
        id: 7,
        name: "broken.io".into(),
        ..Default::default()
    };
    broken
        .senders
        .push(sender(7, &broken, "ops", "not-an-ip"));
    let store = Arc::new(MemoryStore::with_data(None, vec![broken]));
    let engine = FakeEngine::new();
    let reconciler = env.reconciler(store, engine.clone());

    let err = reconciler.apply().await.unwrap_err();
    assert!(matches!(err, ApplyError::Generation(_)));
    assert!(err.result().is_none());
    assert!(!env.policy_dir().exists());
    assert_eq!(engine.validations(), 0);
    assert_eq!(
        reconciler.last_status(),
        Some(ApplyStatus::Aborted {
            phase: ApplyPhase::Generating
        })
    );
}

#[tokio::test]
async fn test_write_failure_stops_before_validation() {
    let env = TestEnv::new();
    let layout = env.config.paths.layout();
    // A directory where a file belongs cannot be read or replaced.
    fs::create_dir_all(&layout.listener_domains).unwrap();
    let engine = FakeEngine::new();
    let reconciler = env.reconciler(acme_store(), engine.clone());

    let err = reconciler.apply().await.unwrap_err();
    assert!(matches!(
        err,
        ApplyError::Write {
            kind: ArtifactKind::ListenerDomains,
            ..
        }
    ));
    assert!(err.result().is_none());
    assert!(layout.sources.is_file());
    assert!(layout.queues.is_file());
    assert!(layout.listener_domains.is_dir());
    assert!(!layout.dkim_data.exists());
    assert!(!layout.init_lua.exists());
    assert_eq!(engine.validations(), 0);
    assert_eq!(engine.restarts(), 0);
    assert_eq!(
        reconciler.last_status(),
        Some(ApplyStatus::Aborted {
            phase: ApplyPhase::Writing
        })
    );
}

#[tokio::test]
async fn test_mixed_case_names_render_lowercase() {
    let env = TestEnv::new();
    let mut domain = Domain {
        id: 3,
        name: "Acme.IO".into(),
        ..Default::default()
    };
    domain.senders.push(sender(3, &domain, "Info", "192.0.2.10"));
    let store = Arc::new(MemoryStore::with_data(None, vec![domain]));
    let reconciler = env.reconciler(store, FakeEngine::new());

    let result = reconciler.apply().await.unwrap();
    let sources = fs::read_to_string(&result.paths.sources).unwrap();
    let dkim = fs::read_to_string(&result.paths.dkim_data).unwrap();
    assert!(sources.contains("[\"acme.io:info\"]"));
    assert!(dkim.contains("match_sender = \"info@acme.io\""));
    assert!(!dkim.contains("Acme"));
}

#[tokio::test]
async fn test_empty_snapshot_still_applies() {
    let env = TestEnv::new();
    let engine = FakeEngine::new();
    let reconciler = env.reconciler(Arc::new(MemoryStore::new()), engine.clone());

    let result = reconciler.apply().await.unwrap();
    assert_eq!(result.artifacts.len(), 5);
    let policy = fs::read_to_string(&result.paths.init_lua).unwrap();
    assert!(policy.contains("hostname = 'localhost'"));
    assert_eq!(engine.restarts(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_artifacts_use_configured_modes() {
    use std::os::unix::fs::PermissionsExt;

    let env = TestEnv::new();
    let reconciler = env.reconciler(acme_store(), FakeEngine::new());
    let result = reconciler.apply().await.unwrap();

    for report in &result.artifacts {
        let mode = fs::metadata(&report.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644, "{}", report.path.display());
    }
}

#[tokio::test]
async fn test_concurrent_applies_are_serialized() {
    let env = TestEnv::new();
    let engine = FakeEngine::with_delay(Duration::from_millis(50));
    let reconciler = Arc::new(env.reconciler(acme_store(), engine.clone()));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.apply().await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(engine.validations(), 4);
    assert_eq!(engine.max_concurrent.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_preview_writes_nothing() {
    let env = TestEnv::new();
    let reconciler = env.reconciler(acme_store(), FakeEngine::new());

    let artifacts = reconciler.preview().unwrap();
    assert_eq!(artifacts.len(), 5);
    assert!(!env.policy_dir().exists());
    assert_eq!(
        reconciler.pending_changes().unwrap(),
        ArtifactKind::ALL.to_vec()
    );

    reconciler.apply().await.unwrap();
    assert!(reconciler.pending_changes().unwrap().is_empty());
}
