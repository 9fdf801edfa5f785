//! Snapshot validation ahead of generation.
//!
//! # Responsibilities
//! - Enforce the snapshot invariants (sender ↔ domain linkage, email shape)
//! - Reject names that cannot be embedded in TOML keys or Lua strings
//! - Detect source/pool name collisions across identities
//!
//! # Design Decisions
//! - Returns every issue, not just the first
//! - A failure here is a data defect; nothing has been written yet

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;

use thiserror::Error;

use crate::generate::{pool_name, source_name};
use crate::store::Snapshot;

/// One problem found in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotIssue {
    InvalidDomainName { domain: String },
    DuplicateDomain { domain: String },
    NotLowercase { name: String },
    MissingSenderId { email: String },
    DuplicateSenderId { id: u64 },
    InvalidLocalPart { domain: String, local_part: String },
    DomainMismatch { sender_id: u64, domain: String, domain_id: u64 },
    EmailMismatch { sender_id: u64, email: String, expected: String },
    InvalidIp { email: String, ip: String },
    DuplicateSource { name: String },
    DuplicatePool { name: String },
    InvalidHostname { hostname: String },
    InvalidRelayIp { ip: String },
    InvalidListenAddr { addr: String },
}

impl fmt::Display for SnapshotIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotIssue::InvalidDomainName { domain } => {
                write!(f, "invalid domain name {domain:?}")
            }
            SnapshotIssue::DuplicateDomain { domain } => write!(f, "duplicate domain {domain:?}"),
            SnapshotIssue::NotLowercase { name } => write!(f, "{name:?} must be lowercase"),
            SnapshotIssue::MissingSenderId { email } => write!(f, "{email} has no sender id"),
            SnapshotIssue::DuplicateSenderId { id } => write!(f, "sender id {id} is used twice"),
            SnapshotIssue::InvalidLocalPart { domain, local_part } => {
                write!(f, "invalid local part {local_part:?} in {domain}")
            }
            SnapshotIssue::DomainMismatch {
                sender_id,
                domain,
                domain_id,
            } => write!(
                f,
                "sender {sender_id} under {domain} references domain id {domain_id}"
            ),
            SnapshotIssue::EmailMismatch {
                sender_id,
                email,
                expected,
            } => write!(f, "sender {sender_id} email {email:?} should be {expected:?}"),
            SnapshotIssue::InvalidIp { email, ip } => write!(f, "{email} has invalid ip {ip:?}"),
            SnapshotIssue::DuplicateSource { name } => write!(f, "duplicate source name {name:?}"),
            SnapshotIssue::DuplicatePool { name } => write!(f, "duplicate pool name {name:?}"),
            SnapshotIssue::InvalidHostname { hostname } => {
                write!(f, "invalid hostname {hostname:?}")
            }
            SnapshotIssue::InvalidRelayIp { ip } => write!(f, "invalid relay ip {ip:?}"),
            SnapshotIssue::InvalidListenAddr { addr } => {
                write!(f, "invalid smtp listen address {addr:?}")
            }
        }
    }
}

/// The snapshot cannot be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("snapshot has {} issue(s): {}", .issues.len(), join(.issues))]
pub struct GenerationError {
    pub issues: Vec<SnapshotIssue>,
}

fn join(issues: &[SnapshotIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn is_dns_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 253
        && !name.starts_with('.')
        && !name.ends_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

fn has_uppercase(name: &str) -> bool {
    name.chars().any(|c| c.is_uppercase())
}

fn is_local_part(local: &str) -> bool {
    !local.is_empty()
        && local.len() <= 64
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '-'))
}

/// Check every invariant the generators rely on.
pub fn validate_snapshot(snapshot: &Snapshot) -> Result<(), GenerationError> {
    let mut issues = Vec::new();
    let mut domains_seen = HashSet::new();
    let mut sources_seen = HashSet::new();
    let mut pools_seen = HashSet::new();
    let mut ids_seen = HashSet::new();

    for domain in snapshot.domains_sorted() {
        if !is_dns_name(&domain.name) {
            issues.push(SnapshotIssue::InvalidDomainName {
                domain: domain.name.clone(),
            });
        }
        // The policy lowercases addresses before every lookup.
        if has_uppercase(&domain.name) {
            issues.push(SnapshotIssue::NotLowercase {
                name: domain.name.clone(),
            });
        }
        if !domains_seen.insert(domain.name.to_lowercase()) {
            issues.push(SnapshotIssue::DuplicateDomain {
                domain: domain.name.clone(),
            });
        }

        for sender in domain.senders_sorted() {
            if sender.id == 0 {
                issues.push(SnapshotIssue::MissingSenderId {
                    email: sender.email.clone(),
                });
            } else if !ids_seen.insert(sender.id) {
                issues.push(SnapshotIssue::DuplicateSenderId { id: sender.id });
            }
            if has_uppercase(&sender.local_part) {
                issues.push(SnapshotIssue::NotLowercase {
                    name: sender.email.clone(),
                });
            }
            if !is_local_part(&sender.local_part) {
                issues.push(SnapshotIssue::InvalidLocalPart {
                    domain: domain.name.clone(),
                    local_part: sender.local_part.clone(),
                });
            }
            if sender.domain_id != domain.id {
                issues.push(SnapshotIssue::DomainMismatch {
                    sender_id: sender.id,
                    domain: domain.name.clone(),
                    domain_id: sender.domain_id,
                });
            }
            let expected = format!("{}@{}", sender.local_part, domain.name);
            if sender.email != expected {
                issues.push(SnapshotIssue::EmailMismatch {
                    sender_id: sender.id,
                    email: sender.email.clone(),
                    expected,
                });
            }
            if sender.ip.parse::<IpAddr>().is_err() {
                issues.push(SnapshotIssue::InvalidIp {
                    email: sender.email.clone(),
                    ip: sender.ip.clone(),
                });
            }

            let source = source_name(domain, sender);
            if !sources_seen.insert(source.to_lowercase()) {
                issues.push(SnapshotIssue::DuplicateSource { name: source });
            }
            // Hyphens are legal in both halves, so distinct identities can share a pool name.
            let pool = pool_name(domain, sender);
            if !pools_seen.insert(pool.to_lowercase()) {
                issues.push(SnapshotIssue::DuplicatePool { name: pool });
            }
        }
    }

    if let Some(settings) = &snapshot.settings {
        let hostname = settings.main_hostname.trim();
        if !hostname.is_empty() && !is_dns_name(hostname) {
            issues.push(SnapshotIssue::InvalidHostname {
                hostname: hostname.to_string(),
            });
        }
        for ip in &settings.relay_ips {
            let ip = ip.trim();
            if !ip.is_empty() && ip.parse::<IpAddr>().is_err() {
                issues.push(SnapshotIssue::InvalidRelayIp { ip: ip.to_string() });
            }
        }
        if let Some(addr) = &settings.smtp_listen_addr {
            if addr.contains(['\'', '"', '\\']) {
                issues.push(SnapshotIssue::InvalidListenAddr { addr: addr.clone() });
            }
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(GenerationError { issues })
    }
}
