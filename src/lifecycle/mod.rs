//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → metrics → store, engine, reconciler → apply on start
//!     → warmup scheduler + state watcher → main loop
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → scheduler and main loop stop
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger apply
//! ```
//!
//! # Design Decisions
//! - An apply in flight is never cancelled; shutdown waits for it
//! - Warmup and watch-driven applies share the reconciler lock

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Daemon, StartupError};
