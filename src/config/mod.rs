//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ReconcilerConfig (validated, immutable)
//!     → shared via Arc with the reconciler, engine and scheduler
//!
//! While the daemon runs:
//!     watcher.rs detects a state file change
//!     → reconciler re-applies from a fresh snapshot
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart of the daemon
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Target paths are explicit config, never constants, so tests point at temp dirs

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ArtifactLayout, EngineConfig, ObservabilityConfig, PathsConfig, PolicyConfig,
    ReconcilerConfig, StoreConfig, WarmupConfig,
};
pub use watcher::StateWatcher;
