//! Artifact generation subsystem.
//!
//! # Data Flow
//! ```text
//! Snapshot
//!     → validate.rs (snapshot invariants, every issue collected)
//!     → sources.rs          → sources.toml
//!     → queues.rs           → queues.toml
//!     → listener.rs         → listener_domains.toml
//!     → dkim.rs             → dkim_data.toml
//!     → policy.rs           → init.lua (written last, reads the four above)
//! ```
//!
//! # Design Decisions
//! - Generators are pure: same snapshot and config, same bytes
//! - Each generator is a total function of current state; stale records vanish
//! - Records are sorted by domain name then local part, never by store order
//! - The two naming rules live here and nowhere else

pub mod dkim;
pub mod listener;
pub mod policy;
pub mod queues;
pub mod sources;
pub mod validate;

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::config::ReconcilerConfig;
use crate::store::{Domain, Sender, Snapshot};

pub use dkim::{dns_records, missing_signing_keys, DkimDnsRecord};
pub use validate::{validate_snapshot, GenerationError, SnapshotIssue};

/// Egress source name for a sender identity: `<domain>:<local-part>`.
pub fn source_name(domain: &Domain, sender: &Sender) -> String {
    format!("{}:{}", domain.name, sender.local_part)
}

/// Egress pool / tenant name for a sender identity: `<domain>-<local-part>`.
pub fn pool_name(domain: &Domain, sender: &Sender) -> String {
    format!("{}-{}", domain.name, sender.local_part)
}

/// The five artifact kinds, in write order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Sources,
    Queues,
    ListenerDomains,
    SigningKeys,
    Policy,
}

impl ArtifactKind {
    /// Write order. The policy comes last because the validator reads it and
    /// it loads every other artifact.
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Sources,
        ArtifactKind::Queues,
        ArtifactKind::ListenerDomains,
        ArtifactKind::SigningKeys,
        ArtifactKind::Policy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Sources => "sources",
            ArtifactKind::Queues => "queues",
            ArtifactKind::ListenerDomains => "listener_domains",
            ArtifactKind::SigningKeys => "signing_keys",
            ArtifactKind::Policy => "policy",
        }
    }

    /// Render this kind for a snapshot.
    pub fn render(self, snapshot: &Snapshot, config: &ReconcilerConfig) -> String {
        match self {
            ArtifactKind::Sources => sources::render(snapshot),
            ArtifactKind::Queues => queues::render(snapshot),
            ArtifactKind::ListenerDomains => listener::render(snapshot),
            ArtifactKind::SigningKeys => dkim::render(
                snapshot,
                &config.paths.dkim_dir,
                &config.policy.signed_headers,
            ),
            ArtifactKind::Policy => policy::render(snapshot, config),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ArtifactKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown artifact kind: {s:?}"))
    }
}

/// One generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub content: String,
}

/// Validate the snapshot and render all five artifacts in write order.
pub fn render_all(
    snapshot: &Snapshot,
    config: &ReconcilerConfig,
) -> Result<Vec<Artifact>, GenerationError> {
    validate_snapshot(snapshot)?;

    let layout = config.paths.layout();
    Ok(ArtifactKind::ALL
        .into_iter()
        .map(|kind| Artifact {
            kind,
            path: layout.path(kind).to_path_buf(),
            content: kind.render(snapshot, config),
        })
        .collect())
}

/// Quote a TOML basic string.
pub(crate) fn toml_str(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// Quote a Lua single-quoted string.
pub(crate) fn lua_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Section banner used by the TOML generators.
pub(crate) fn banner(out: &mut String, title: &str) {
    out.push_str("# ========================================\n");
    out.push_str("# ");
    out.push_str(title);
    out.push('\n');
    out.push_str("# ========================================\n\n");
}
