//! Control of the external mail engine.
//!
//! # Responsibilities
//! - Validate a policy file with the engine's own checker
//! - Restart the engine service
//!
//! # Design Decisions
//! - Both operations sit behind [`EngineControl`] so the reconciler can be
//!   driven by a fake in tests
//! - A non-zero exit is an `Ok` outcome with `ok = false`; only failing to run
//!   the command at all is an `Err`

mod system;

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use system::SystemEngine;

/// Result of one external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub ok: bool,

    /// Combined stdout and stderr.
    pub log: String,
}

impl CommandOutcome {
    pub fn success(log: impl Into<String>) -> Self {
        Self {
            ok: true,
            log: log.into(),
        }
    }

    pub fn failure(log: impl Into<String>) -> Self {
        Self {
            ok: false,
            log: log.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Validation and restart of the mail engine.
#[async_trait]
pub trait EngineControl: Send + Sync {
    /// Run the engine's validate mode against `policy`.
    async fn validate(&self, policy: &Path) -> Result<CommandOutcome, EngineError>;

    /// Restart the engine service.
    async fn restart(&self) -> Result<CommandOutcome, EngineError>;
}
