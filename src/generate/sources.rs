//! `sources.toml`: one egress source per sender identity.

use crate::generate::{banner, source_name, toml_str};
use crate::store::Snapshot;

pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    for domain in snapshot.domains_sorted() {
        if domain.senders.is_empty() {
            continue;
        }
        banner(&mut out, &format!("{} Sources", domain.name));

        for sender in domain.senders_sorted() {
            let ehlo = format!("{}.{}", sender.local_part, domain.name);
            out.push_str(&format!("[{}]\n", toml_str(&source_name(domain, sender))));
            out.push_str(&format!("source_address = {}\n", toml_str(&sender.ip)));
            out.push_str(&format!("ehlo_domain = {}\n\n", toml_str(&ehlo)));
        }
    }
    out
}
