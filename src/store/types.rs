//! Snapshot data model.

use serde::{Deserialize, Serialize};

use std::collections::HashSet;

use crate::store::StoreError;
use crate::warmup::WarmupState;

/// Global settings. At most one record exists; a fresh install has none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Public hostname of the relay (e.g., "mta.example.com").
    pub main_hostname: String,

    pub main_server_ip: String,

    /// Hosts allowed to relay through the engine, besides loopback.
    pub relay_ips: Vec<String>,

    /// Overrides the default SMTP listen address.
    pub smtp_listen_addr: Option<String>,

    pub ai_provider: Option<String>,
    pub webhook_url: Option<String>,
}

/// A domain managed by the relay.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Domain {
    pub id: u64,
    pub name: String,
    pub mail_host: String,
    pub bounce_host: String,
    pub dmarc_policy: String,
    pub dmarc_rua: String,
    pub dmarc_ruf: String,
    pub dmarc_percentage: u8,
    pub senders: Vec<Sender>,
}

impl Domain {
    /// Senders ordered by local part.
    pub fn senders_sorted(&self) -> Vec<&Sender> {
        let mut senders: Vec<&Sender> = self.senders.iter().collect();
        senders.sort_by(|a, b| a.local_part.cmp(&b.local_part).then(a.id.cmp(&b.id)));
        senders
    }
}

/// A sender identity (`local_part@domain`) bound to one egress IP.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Sender {
    pub id: u64,
    pub domain_id: u64,
    pub local_part: String,
    pub email: String,
    pub ip: String,
    pub warmup: WarmupState,
}

/// Point-in-time view of everything the generators read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub settings: Option<Settings>,
    pub domains: Vec<Domain>,
}

impl Snapshot {
    pub fn new(settings: Option<Settings>, domains: Vec<Domain>) -> Self {
        Self { settings, domains }
    }

    /// Domains ordered by name.
    pub fn domains_sorted(&self) -> Vec<&Domain> {
        let mut domains: Vec<&Domain> = self.domains.iter().collect();
        domains.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        domains
    }

    /// Every (domain, sender) pair, ordered by domain name then local part.
    pub fn identities(&self) -> Vec<(&Domain, &Sender)> {
        self.domains_sorted()
            .into_iter()
            .flat_map(|d| d.senders_sorted().into_iter().map(move |s| (d, s)))
            .collect()
    }

    /// Hostname announced by the engine, `localhost` when unset.
    pub fn hostname(&self) -> &str {
        self.settings
            .as_ref()
            .map(|s| s.main_hostname.trim())
            .filter(|h| !h.is_empty())
            .unwrap_or("localhost")
    }

    pub fn sender_count(&self) -> usize {
        self.domains.iter().map(|d| d.senders.len()).sum()
    }

    pub fn check_sender_ids(&self) -> Result<(), StoreError> {
        check_sender_ids(&self.domains)
    }
}

/// Fill in fields that are derivable from the parent domain.
///
/// Names and addresses are lowercased, senders nested under a domain inherit
/// its id, and an empty email becomes `local_part@domain`.
pub(crate) fn normalize_domains(domains: &mut [Domain]) {
    for domain in domains.iter_mut() {
        domain.name = domain.name.to_lowercase();
        for sender in domain.senders.iter_mut() {
            sender.local_part = sender.local_part.to_lowercase();
            sender.email = sender.email.to_lowercase();
            if sender.domain_id == 0 {
                sender.domain_id = domain.id;
            }
            if sender.email.is_empty() {
                sender.email = format!("{}@{}", sender.local_part, domain.name);
            }
        }
    }
}

/// Warmup progress is saved by sender id, so every sender needs a distinct
/// non-zero one.
pub fn check_sender_ids(domains: &[Domain]) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for sender in domains.iter().flat_map(|d| d.senders.iter()) {
        if sender.id == 0 {
            return Err(StoreError::MissingSenderId {
                email: sender.email.clone(),
            });
        }
        if !seen.insert(sender.id) {
            return Err(StoreError::DuplicateSenderId(sender.id));
        }
    }
    Ok(())
}
