//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the reconciler.
//! All types derive Serde traits for deserialization from config files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::generate::ArtifactKind;

/// Root configuration for the reconciler.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ReconcilerConfig {
    /// Where generated artifacts and signing keys live.
    pub paths: PathsConfig,

    /// How the external mail engine is validated and restarted.
    pub engine: EngineConfig,

    /// Values baked into the bootstrap policy script.
    pub policy: PolicyConfig,

    /// Snapshot state file settings.
    pub store: StoreConfig,

    /// Warmup scheduler settings.
    pub warmup: WarmupConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Target file locations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding every generated artifact.
    pub policy_dir: PathBuf,

    /// Root of the signing-key tree (`<dkim_dir>/<domain>/<selector>.key`).
    pub dkim_dir: PathBuf,

    pub sources_file: String,
    pub queues_file: String,
    pub listener_domains_file: String,
    pub dkim_data_file: String,
    pub init_lua_file: String,

    /// Permission bits for every written artifact.
    pub file_mode: u32,

    /// Permission bits used when the policy directory has to be created.
    pub dir_mode: u32,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            policy_dir: PathBuf::from("/opt/kumomta/etc/policy"),
            dkim_dir: PathBuf::from("/opt/kumomta/etc/dkim"),
            sources_file: "sources.toml".to_string(),
            queues_file: "queues.toml".to_string(),
            listener_domains_file: "listener_domains.toml".to_string(),
            dkim_data_file: "dkim_data.toml".to_string(),
            init_lua_file: "init.lua".to_string(),
            file_mode: 0o644,
            dir_mode: 0o755,
        }
    }
}

impl PathsConfig {
    /// Resolve the absolute path of every artifact.
    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout {
            sources: self.policy_dir.join(&self.sources_file),
            queues: self.policy_dir.join(&self.queues_file),
            listener_domains: self.policy_dir.join(&self.listener_domains_file),
            dkim_data: self.policy_dir.join(&self.dkim_data_file),
            init_lua: self.policy_dir.join(&self.init_lua_file),
        }
    }
}

/// Resolved artifact paths, one per [`ArtifactKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactLayout {
    pub sources: PathBuf,
    pub queues: PathBuf,
    pub listener_domains: PathBuf,
    pub dkim_data: PathBuf,
    pub init_lua: PathBuf,
}

impl ArtifactLayout {
    pub fn path(&self, kind: ArtifactKind) -> &Path {
        match kind {
            ArtifactKind::Sources => &self.sources,
            ArtifactKind::Queues => &self.queues,
            ArtifactKind::ListenerDomains => &self.listener_domains,
            ArtifactKind::SigningKeys => &self.dkim_data,
            ArtifactKind::Policy => &self.init_lua,
        }
    }
}

/// External engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine binary, invoked with `--validate` against the policy.
    pub binary: PathBuf,

    /// Account the engine runs as (passed to `--user`).
    pub service_account: String,

    /// Service manager executable (e.g., "systemctl").
    pub service_manager: String,

    /// Service unit restarted after a successful validation.
    pub service_unit: String,

    /// Validation deadline in seconds.
    pub validate_timeout_secs: u64,

    /// Restart deadline in seconds.
    pub restart_timeout_secs: u64,

    /// Skip the restart when nothing changed and the engine already runs the
    /// current files.
    pub skip_unchanged_restart: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/opt/kumomta/sbin/kumod"),
            service_account: "kumod".to_string(),
            service_manager: "systemctl".to_string(),
            service_unit: "kumomta".to_string(),
            validate_timeout_secs: 30,
            restart_timeout_secs: 60,
            skip_unchanged_restart: false,
        }
    }
}

/// Static values written into the bootstrap policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Spool root; `data` and `meta` spools live below it.
    pub spool_dir: String,

    pub log_dir: String,

    pub bounce_classifier: String,

    /// Engine HTTP listener (injection API).
    pub http_listen: String,

    /// SMTP listen address used when settings do not provide one.
    pub default_smtp_listen: String,

    /// Additional submission listeners sharing hostname and relay hosts.
    pub submission_listeners: Vec<String>,

    /// Optional operator hook loaded at the end of the policy.
    pub custom_hook: String,

    /// Headers covered by DKIM signatures.
    pub signed_headers: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            spool_dir: "/var/spool/kumomta".to_string(),
            log_dir: "/var/log/kumomta".to_string(),
            bounce_classifier: "/opt/kumomta/share/bounce_classifier/iana.toml".to_string(),
            http_listen: "127.0.0.1:8000".to_string(),
            default_smtp_listen: "127.0.0.1:25".to_string(),
            submission_listeners: vec!["0.0.0.0:587".to_string(), "0.0.0.0:465".to_string()],
            custom_hook: "/opt/kumomta/etc/policy/custom.lua".to_string(),
            // X- headers are scrubbed before signing, so they must stay out of this list.
            signed_headers: ["From", "To", "Subject", "Date", "Message-ID", "List-Unsubscribe"]
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

/// Snapshot state file configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// TOML document holding settings, domains and senders.
    pub state_file: PathBuf,

    /// Re-apply whenever the state file changes.
    pub watch: bool,

    /// Apply once when the daemon starts.
    pub apply_on_start: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from("/var/lib/relay-reconciler/state.toml"),
            watch: true,
            apply_on_start: true,
        }
    }
}

/// Warmup scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub enabled: bool,

    /// How often the scheduler wakes up, in seconds.
    pub interval_secs: u64,

    /// Minimum time between two advances of the same sender, in seconds.
    pub advance_after_secs: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 86_400,
            advance_after_secs: 86_400,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
