//! Mail relay configuration reconciler.
//!
//! Derives the mail engine's control-plane files from a snapshot of domains,
//! sender identities and settings, writes them safely, and restarts the engine
//! only after it has validated the new policy.
//!
//! # Architecture Overview
//!
//! ```text
//!   state file / store ──▶ store::Snapshot
//!                               │
//!                               ▼
//!                      generate::render_all ──▶ five artifacts (sorted, deterministic)
//!                               │
//!                               ▼
//!                      files::smart_update   ──▶ policy dir (+ .bak on change)
//!                               │
//!                               ▼
//!                      engine::validate ──ok──▶ engine::restart
//!                               │
//!                               ▼
//!                      reconcile::ApplyResult
//!
//!   warmup::WarmupScheduler ──(rate changed)──▶ reconcile::Reconciler::apply
//!   lifecycle::Daemon: watcher + SIGHUP + scheduler, one apply at a time
//! ```

// Core pipeline
pub mod engine;
pub mod files;
pub mod generate;
pub mod reconcile;
pub mod store;
pub mod warmup;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::ReconcilerConfig;
pub use lifecycle::{Daemon, Shutdown};
pub use reconcile::{ApplyError, ApplyResult, Reconciler};
