//! In-memory snapshot store.

use std::sync::RwLock;

use crate::store::types::{normalize_domains, Domain, Sender, Settings, Snapshot};
use crate::store::{ConfigStore, StoreError};
use crate::warmup::WarmupState;

#[derive(Debug, Default)]
struct StoreData {
    settings: Option<Settings>,
    domains: Vec<Domain>,
}

/// Lock-protected store for embedding the reconciler behind another data layer.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<StoreData>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing records.
    pub fn with_data(settings: Option<Settings>, mut domains: Vec<Domain>) -> Self {
        normalize_domains(&mut domains);
        Self {
            data: RwLock::new(StoreData { settings, domains }),
        }
    }

    pub fn set_settings(&self, settings: Option<Settings>) -> Result<(), StoreError> {
        self.write(|data| {
            data.settings = settings;
            Ok(())
        })
    }

    /// Insert a domain, replacing any domain with the same id.
    pub fn upsert_domain(&self, domain: Domain) -> Result<(), StoreError> {
        self.write(|data| {
            let mut domain = domain;
            normalize_domains(std::slice::from_mut(&mut domain));
            match data.domains.iter_mut().find(|d| d.id == domain.id) {
                Some(existing) => *existing = domain,
                None => data.domains.push(domain),
            }
            Ok(())
        })
    }

    pub fn remove_domain(&self, domain_id: u64) -> Result<(), StoreError> {
        self.write(|data| {
            data.domains.retain(|d| d.id != domain_id);
            Ok(())
        })
    }

    /// Apply `f` to one sender in place.
    pub fn update_sender<F>(&self, sender_id: u64, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Sender),
    {
        self.write(|data| {
            let sender = data
                .domains
                .iter_mut()
                .flat_map(|d| d.senders.iter_mut())
                .find(|s| s.id == sender_id)
                .ok_or(StoreError::UnknownSender(sender_id))?;
            f(sender);
            Ok(())
        })
    }

    pub fn sender(&self, sender_id: u64) -> Result<Sender, StoreError> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        data.domains
            .iter()
            .flat_map(|d| d.senders.iter())
            .find(|s| s.id == sender_id)
            .cloned()
            .ok_or(StoreError::UnknownSender(sender_id))
    }

    fn write<T>(
        &self,
        f: impl FnOnce(&mut StoreData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut data = self
            .data
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        f(&mut data)
    }
}

impl ConfigStore for MemoryStore {
    fn load_snapshot(&self) -> Result<Snapshot, StoreError> {
        let data = self
            .data
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        Ok(Snapshot::new(data.settings.clone(), data.domains.clone()))
    }

    fn save_warmup(&self, sender_id: u64, state: &WarmupState) -> Result<(), StoreError> {
        self.update_sender(sender_id, |sender| sender.warmup = state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Domain {
        Domain {
            id: 1,
            name: "acme.io".into(),
            senders: vec![Sender {
                id: 10,
                local_part: "info".into(),
                ip: "192.0.2.10".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_snapshot_is_detached_copy() {
        let store = MemoryStore::with_data(None, vec![acme()]);
        let before = store.load_snapshot().unwrap();

        store
            .update_sender(10, |s| s.ip = "192.0.2.99".into())
            .unwrap();

        assert_eq!(before.domains[0].senders[0].ip, "192.0.2.10");
        let after = store.load_snapshot().unwrap();
        assert_eq!(after.domains[0].senders[0].ip, "192.0.2.99");
    }

    #[test]
    fn test_upsert_normalizes_and_replaces() {
        let store = MemoryStore::new();
        store.upsert_domain(acme()).unwrap();
        assert_eq!(store.sender(10).unwrap().email, "info@acme.io");

        let mut renamed = acme();
        renamed.mail_host = "mail.acme.io".into();
        store.upsert_domain(renamed).unwrap();
        let snapshot = store.load_snapshot().unwrap();
        assert_eq!(snapshot.domains.len(), 1);
        assert_eq!(snapshot.domains[0].mail_host, "mail.acme.io");
    }

    #[test]
    fn test_save_warmup_unknown_sender() {
        let store = MemoryStore::new();
        let err = store.save_warmup(42, &WarmupState::default()).unwrap_err();
        assert!(matches!(err, StoreError::UnknownSender(42)));
    }
}
