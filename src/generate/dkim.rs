//! `dkim_data.toml` plus the DNS records operators publish for each selector.
//!
//! The selector of an identity is its local part. Key pairs are produced
//! elsewhere under `<dkim_dir>/<domain>/<selector>.{key,pub}`; this module only
//! references and reads them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::generate::{banner, source_name, toml_str};
use crate::store::{Domain, Sender, Snapshot};

/// Private key location for one identity.
pub fn key_path(dkim_dir: &Path, domain: &Domain, sender: &Sender) -> PathBuf {
    dkim_dir
        .join(&domain.name)
        .join(format!("{}.key", sender.local_part))
}

fn public_key_path(dkim_dir: &Path, domain: &Domain, sender: &Sender) -> PathBuf {
    dkim_dir
        .join(&domain.name)
        .join(format!("{}.pub", sender.local_part))
}

pub fn render(snapshot: &Snapshot, dkim_dir: &Path, headers: &[String]) -> String {
    let headers = headers
        .iter()
        .map(|h| toml_str(h))
        .collect::<Vec<_>>()
        .join(", ");
    let mut out = String::new();

    for domain in snapshot.domains_sorted() {
        if domain.senders.is_empty() {
            continue;
        }
        banner(&mut out, &format!("{} DKIM", domain.name));

        let key = format!("domain.{}", toml_str(&domain.name));
        out.push_str(&format!("[{key}]\n"));
        out.push_str(&format!("headers = [{headers}]\n\n"));

        for sender in domain.senders_sorted() {
            let filename = key_path(dkim_dir, domain, sender);
            out.push_str(&format!("[[{key}.policy]]\n"));
            out.push_str(&format!("selector = {}\n", toml_str(&sender.local_part)));
            out.push_str(&format!(
                "filename = {}\n",
                toml_str(&filename.to_string_lossy())
            ));
            out.push_str(&format!("match_sender = {}\n", toml_str(&sender.email)));
            out.push_str(&format!(
                "source = {}\n\n",
                toml_str(&source_name(domain, sender))
            ));
        }
    }
    out
}

/// A TXT record to publish for one selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DkimDnsRecord {
    pub domain: String,
    pub selector: String,
    pub dns_name: String,
    pub dns_value: String,
}

/// Strip PEM armour and whitespace, leaving the base64 body.
fn pem_body(pem: &str) -> String {
    pem.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("-----"))
        .collect()
}

/// DNS records for every identity whose public key is on disk. Identities
/// without a readable `.pub` file are skipped.
pub fn dns_records(snapshot: &Snapshot, dkim_dir: &Path) -> Vec<DkimDnsRecord> {
    let mut records = Vec::new();

    for domain in snapshot.domains_sorted() {
        for sender in domain.senders_sorted() {
            let path = public_key_path(dkim_dir, domain, sender);
            let pem = match fs::read_to_string(&path) {
                Ok(pem) => pem,
                Err(e) => {
                    tracing::debug!(path = ?path, error = %e, "No public key, skipping");
                    continue;
                }
            };
            let body = pem_body(&pem);
            if body.is_empty() {
                continue;
            }
            records.push(DkimDnsRecord {
                domain: domain.name.clone(),
                selector: sender.local_part.clone(),
                dns_name: format!("{}._domainkey.{}", sender.local_part, domain.name),
                dns_value: format!("v=DKIM1; k=rsa; p={body}"),
            });
        }
    }
    records
}

/// Private key files referenced by the signing registry that do not exist.
pub fn missing_signing_keys(snapshot: &Snapshot, dkim_dir: &Path) -> Vec<PathBuf> {
    snapshot
        .domains_sorted()
        .into_iter()
        .flat_map(|domain| {
            domain
                .senders_sorted()
                .into_iter()
                .map(move |sender| key_path(dkim_dir, domain, sender))
        })
        .filter(|path| !path.exists())
        .collect()
}
