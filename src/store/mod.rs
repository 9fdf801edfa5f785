//! Snapshot storage subsystem.
//!
//! # Data Flow
//! ```text
//! relational state (external) ─┐
//! state file (file.rs) ────────┼→ ConfigStore::load_snapshot → Snapshot
//! in-memory (memory.rs) ───────┘
//!
//! Warmup scheduler:
//!     → ConfigStore::save_warmup (one sender at a time)
//! ```
//!
//! # Design Decisions
//! - A fresh snapshot is loaded for every apply; nothing is cached
//! - A missing settings record is not an error
//! - A missing or unreadable state file IS an error: generating from an empty
//!   snapshot would wipe the live configuration

pub mod file;
pub mod memory;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;

use crate::files::UpdateError;
use crate::warmup::WarmupState;

pub use file::StateFile;
pub use memory::MemoryStore;
pub use types::{Domain, Sender, Settings, Snapshot};

/// Errors raised by snapshot stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to persist state: {0}")]
    Write(#[from] UpdateError),

    #[error("sender {0} does not exist")]
    UnknownSender(u64),

    #[error("sender {email} has no id")]
    MissingSenderId { email: String },

    #[error("sender id {0} is used more than once")]
    DuplicateSenderId(u64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Source of snapshots and sink for warmup progress.
pub trait ConfigStore: Send + Sync {
    /// Read settings and every domain with its senders.
    fn load_snapshot(&self) -> Result<Snapshot, StoreError>;

    /// Persist the warmup state of one sender.
    fn save_warmup(&self, sender_id: u64, state: &WarmupState) -> Result<(), StoreError>;
}
