use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::engine::EngineError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking creation attempts. Labels: outcome.
pub const BOOKINGS_TOTAL: &str = "roomledger_bookings_total";

/// Counter: cancellation attempts. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "roomledger_cancellations_total";

/// Counter: payment attempts. Labels: outcome.
pub const PAYMENTS_TOTAL: &str = "roomledger_payments_total";

// ── Reconciliation ──────────────────────────────────────────────

/// Counter: reconciliation sweeps run.
pub const RECONCILE_RUNS_TOTAL: &str = "roomledger_reconcile_runs_total";

/// Counter: bookings moved to COMPLETED by sweeps.
pub const RECONCILE_COMPLETED_TOTAL: &str = "roomledger_reconcile_completed_total";

/// Counter: per-item sweep failures that were skipped.
pub const RECONCILE_FAILURES_TOTAL: &str = "roomledger_reconcile_failures_total";

/// Histogram: sweep duration in seconds.
pub const RECONCILE_DURATION_SECONDS: &str = "roomledger_reconcile_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms in the inventory.
pub const ROOMS_REGISTERED: &str = "roomledger_rooms_registered";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roomledger_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roomledger_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Count an operation under `name`, labelled `ok` or with the error's label.
pub fn record_outcome<T>(name: &'static str, result: &Result<T, EngineError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.label(),
    };
    metrics::counter!(name, "outcome" => outcome).increment(1);
}
