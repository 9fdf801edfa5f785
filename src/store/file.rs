//! TOML state file store.
//!
//! Document shape:
//! ```toml
//! [settings]
//! main_hostname = "mta.acme.io"
//! relay_ips = ["198.51.100.7"]
//!
//! [[domains]]
//! id = 1
//! name = "acme.io"
//!
//! [[domains.senders]]
//! id = 1
//! local_part = "info"
//! ip = "203.0.113.10"
//!
//! [domains.senders.warmup]
//! enabled = true
//! plan = "standard"
//! day = 3
//! last_update = "2026-01-01T00:00:00Z"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::files;
use crate::store::types::{check_sender_ids, normalize_domains, Domain, Settings, Snapshot};
use crate::store::{ConfigStore, StoreError};
use crate::warmup::WarmupState;

/// Mode for a state file that somehow lost its own permissions.
const STATE_FILE_MODE: u32 = 0o600;

#[derive(Debug, Default, Deserialize, Serialize)]
struct StateDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings: Option<Settings>,

    #[serde(default)]
    domains: Vec<Domain>,
}

/// Store backed by a single TOML document.
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<StateDocument, StoreError> {
        let content = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut document: StateDocument =
            toml::from_str(&content).map_err(|source| StoreError::Parse {
                path: self.path.clone(),
                source,
            })?;
        normalize_domains(&mut document.domains);
        check_sender_ids(&document.domains)?;
        Ok(document)
    }
}

impl ConfigStore for StateFile {
    fn load_snapshot(&self) -> Result<Snapshot, StoreError> {
        let document = self.read_document()?;
        Ok(Snapshot::new(document.settings, document.domains))
    }

    fn save_warmup(&self, sender_id: u64, state: &WarmupState) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Unavailable("state file lock poisoned".into()))?;

        let mut document = self.read_document()?;
        let sender = document
            .domains
            .iter_mut()
            .flat_map(|d| d.senders.iter_mut())
            .find(|s| s.id == sender_id)
            .ok_or(StoreError::UnknownSender(sender_id))?;
        sender.warmup = state.clone();

        // Atomic replace without a `.bak`; the operator's permissions are kept.
        let content = toml::to_string_pretty(&document)?;
        let mode = files::current_mode(&self.path).unwrap_or(STATE_FILE_MODE);
        files::stage(&self.path, content.as_bytes(), mode)?.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warmup::WarmupPlan;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    const DOCUMENT: &str = r#"
[settings]
main_hostname = "mta.acme.io"
relay_ips = ["198.51.100.7"]

[[domains]]
id = 1
name = "acme.io"

[[domains.senders]]
id = 5
local_part = "info"
ip = "203.0.113.10"

[domains.senders.warmup]
enabled = true
plan = "aggressive"
day = 2
"#;

    #[test]
    fn test_load_normalizes_senders() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, DOCUMENT).unwrap();

        let snapshot = StateFile::new(&path).load_snapshot().unwrap();
        assert_eq!(snapshot.hostname(), "mta.acme.io");
        let sender = &snapshot.domains[0].senders[0];
        assert_eq!(sender.email, "info@acme.io");
        assert_eq!(sender.domain_id, 1);
        assert_eq!(sender.warmup.plan, WarmupPlan::Aggressive);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = StateFile::new(dir.path().join("absent.toml"))
            .load_snapshot()
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_unknown_plan_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, DOCUMENT.replace("aggressive", "turbo")).unwrap();

        let err = StateFile::new(&path).load_snapshot().unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn test_ids_are_required() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, DOCUMENT.replace("id = 5\n", "")).unwrap();

        let err = StateFile::new(&path).load_snapshot().unwrap_err();
        assert!(matches!(err, StoreError::MissingSenderId { .. }));
    }

    #[test]
    fn test_load_lowercases_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(
            &path,
            DOCUMENT
                .replace("\"acme.io\"", "\"Acme.io\"")
                .replace("\"info\"", "\"Info\""),
        )
        .unwrap();

        let snapshot = StateFile::new(&path).load_snapshot().unwrap();
        assert_eq!(snapshot.domains[0].name, "acme.io");
        assert_eq!(snapshot.domains[0].senders[0].email, "info@acme.io");
    }

    #[cfg(unix)]
    #[test]
    fn test_save_keeps_mode_and_leaves_no_backup() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, DOCUMENT).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        let state = WarmupState::start(WarmupPlan::Standard, Utc::now());
        StateFile::new(&path).save_warmup(5, &state).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
        assert!(!files::backup_path(&path).exists());
    }

    #[test]
    fn test_save_warmup_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.toml");
        fs::write(&path, DOCUMENT).unwrap();
        let store = StateFile::new(&path);

        let stamp = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let state = WarmupState {
            enabled: true,
            plan: WarmupPlan::Aggressive,
            day: 3,
            last_update: Some(stamp),
        };
        store.save_warmup(5, &state).unwrap();

        let snapshot = store.load_snapshot().unwrap();
        assert_eq!(snapshot.domains[0].senders[0].warmup, state);
        assert_eq!(snapshot.hostname(), "mta.acme.io");
    }
}
