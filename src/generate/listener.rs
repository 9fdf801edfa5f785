//! `listener_domains.toml`: which recipient domains the listeners accept.

use crate::generate::{source_name, toml_str};
use crate::store::Snapshot;

pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    for domain in snapshot.domains_sorted() {
        let sources: Vec<String> = domain
            .senders_sorted()
            .into_iter()
            .map(|s| toml_str(&source_name(domain, s)))
            .collect();

        out.push_str(&format!("[{}]\n", toml_str(&domain.name)));
        out.push_str(&format!("relay_to = {}\n", !sources.is_empty()));
        out.push_str("log_oob = true\n");
        out.push_str("log_arf = true\n");
        out.push_str(&format!("sources = [{}]\n\n", sources.join(", ")));
    }
    out
}
