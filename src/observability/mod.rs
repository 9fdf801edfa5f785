//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! reconcile / warmup / files produce:
//!     → logging.rs (structured events carrying run_id, path, kind, sender)
//!     → metrics.rs (apply outcomes, artifact writes, warmup transitions)
//!
//! Consumers:
//!     → stdout (human or JSON lines)
//!     → Metrics endpoint (Prometheus scrape), when enabled
//! ```
//!
//! # Design Decisions
//! - Each apply runs inside a span carrying its run id
//! - Metrics are opt-in; the recorder is only installed by the daemon

pub mod logging;
pub mod metrics;
