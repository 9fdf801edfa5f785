//! Apply pipeline.
//!
//! # Data Flow
//! ```text
//! apply()
//!     → lock the managed engine (one run at a time)
//!     → store.load_snapshot()            abort: Snapshot
//!     → generate::render_all()           abort: Generation
//!     → files::smart_update() × 5        abort: Write (earlier files stay)
//!     → engine.validate(init.lua)        stop: ValidationFailed, no restart
//!     → engine.restart()                 stop: RestartFailed (critical)
//!     → ApplyResult
//! ```
//!
//! # Design Decisions
//! - Validation reads the live policy file that was just written
//! - No retries; re-running apply is always safe because writes are no-ops
//!   when nothing changed
//! - The last terminal status is kept for status queries

mod pipeline;
mod result;

pub use pipeline::Reconciler;
pub use result::{ApplyError, ApplyPhase, ApplyResult, ApplyStatus, ArtifactReport};
