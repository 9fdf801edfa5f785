//! Diff-aware atomic file replacement.
//!
//! # Responsibilities
//! - Skip writes whose bytes already match the target (mtime preserved)
//! - Keep a best-effort `<path>.bak` of the previous content
//! - Replace the target via a same-directory temp file and rename
//!
//! # Design Decisions
//! - The target always holds either the old or the complete new content
//! - Backup failures are logged, never fatal
//! - Writing is split into `stage` and `commit` so an interrupted write can be
//!   reproduced by dropping the staged file

mod update;

pub use update::{
    backup_path, current_mode, ensure_dir, smart_update, stage, StagedFile, UpdateError, UpdateOutcome,
};
