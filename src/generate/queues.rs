//! `queues.toml`: one tenant per sender identity, carrying its warmup rate.

use crate::generate::{banner, pool_name, toml_str};
use crate::store::Snapshot;

const RETRY_INTERVAL: &str = "1m";
const MAX_AGE: &str = "3d";

pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();

    for domain in snapshot.domains_sorted() {
        if domain.senders.is_empty() {
            continue;
        }
        banner(&mut out, &format!("{} Tenants", domain.name));

        for sender in domain.senders_sorted() {
            let pool = pool_name(domain, sender);
            out.push_str(&format!("[{}]\n", toml_str(&format!("tenant:{pool}"))));
            out.push_str(&format!("egress_pool = {}\n", toml_str(&pool)));
            out.push_str(&format!("retry_interval = {}\n", toml_str(RETRY_INTERVAL)));
            out.push_str(&format!("max_age = {}\n", toml_str(MAX_AGE)));
            if let Some(rate) = sender.warmup.current_rate() {
                out.push_str(&format!("max_message_rate = {}\n", toml_str(rate)));
            }
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::fixtures;

    #[test]
    fn test_tenant_tables() {
        let table: toml::Table = render(&fixtures::two_domains()).parse().unwrap();

        assert_eq!(table.len(), 3);
        let info = table["tenant:acme.io-info"].as_table().unwrap();
        assert_eq!(info["egress_pool"].as_str(), Some("acme.io-info"));
        assert_eq!(info["retry_interval"].as_str(), Some("1m"));
        assert_eq!(info["max_age"].as_str(), Some("3d"));
        assert_eq!(info["max_message_rate"].as_str(), Some("100/hr"));
    }

    #[test]
    fn test_no_rate_without_warmup() {
        let table: toml::Table = render(&fixtures::two_domains()).parse().unwrap();
        let news = table["tenant:zeta.io-news"].as_table().unwrap();
        assert!(!news.contains_key("max_message_rate"));
    }
}
