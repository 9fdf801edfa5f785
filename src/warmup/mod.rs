//! IP warmup.
//!
//! # Data Flow
//! ```text
//! interval tick
//!     → store.load_snapshot()
//!     → plan::advance() per warmup-enabled sender
//!     → store.save_warmup() for every changed sender
//!     → Reconciler::apply() once, if any rate changed
//! ```
//!
//! # Design Decisions
//! - Plans are a closed set with fixed rate tables
//! - The first observation of a sender only starts its clock
//! - Running past the last day disables warmup (unlimited rate)

mod plan;
mod scheduler;

pub use plan::{advance, WarmupPlan, WarmupState, WarmupStep};
pub use scheduler::{WarmupError, WarmupReport, WarmupScheduler, WarmupTransition};
