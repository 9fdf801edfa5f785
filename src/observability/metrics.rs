//! Metrics collection and exposition.
//!
//! # Metrics
//! - `reconciler_apply_total` (counter): apply runs by terminal `outcome`
//! - `reconciler_apply_duration_seconds` (histogram): wall time of one apply
//! - `reconciler_artifact_writes_total` (counter): smart updates by `kind`, `outcome`
//! - `reconciler_warmup_transitions_total` (counter): warmup steps by `step`
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with its scrape endpoint on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_apply(outcome: &'static str, started: Instant) {
    metrics::counter!("reconciler_apply_total", "outcome" => outcome).increment(1);
    metrics::histogram!("reconciler_apply_duration_seconds")
        .record(started.elapsed().as_secs_f64());
}

pub fn record_artifact_write(kind: &'static str, outcome: &'static str) {
    metrics::counter!(
        "reconciler_artifact_writes_total",
        "kind" => kind,
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_warmup_transition(step: &'static str) {
    metrics::counter!("reconciler_warmup_transitions_total", "step" => step).increment(1);
}
