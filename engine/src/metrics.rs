//! Business metrics for the stock ledger.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `stock_ledger_reservations_total{status}` - Reservations by outcome
//!   (created, rejected, released, expired, replayed)
//! - `stock_ledger_transfers_total{status}` - Transfers by outcome (completed, failed)
//! - `stock_ledger_transferred_units_total` - Units moved between warehouses
//! - `stock_ledger_sweep_released_total` - Reservations released by the expiry sweep
//!
//! ## Gauges
//! - `stock_ledger_low_stock_alerts` - Alerts raised by the last low-stock scan

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Exporter could not be installed
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Register all business metric descriptions.
///
/// Call once at startup, before any metrics are recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "stock_ledger_reservations_total",
        "Total number of reservations by status (created, rejected, released, expired, replayed)"
    );
    describe_counter!(
        "stock_ledger_transfers_total",
        "Total number of transfers by status (completed, failed)"
    );
    describe_counter!(
        "stock_ledger_transferred_units_total",
        "Total units moved between warehouses"
    );
    describe_counter!(
        "stock_ledger_sweep_released_total",
        "Total reservations released by the expiry sweep"
    );
    describe_gauge!(
        "stock_ledger_low_stock_alerts",
        "Number of low-stock alerts raised by the last scan"
    );

    tracing::info!("Business metrics registered");
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must run inside a tokio runtime.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed or the
/// listener cannot bind.
pub fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_business_metrics();
    tracing::info!(%addr, "Metrics server started - available at http://{addr}/metrics");
    Ok(())
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a reservation created.
pub fn record_reservation_created(quantity: u32) {
    metrics::counter!("stock_ledger_reservations_total", "status" => "created").increment(1);
    tracing::debug!(quantity, "Recorded reservation_created metric");
}

/// Record a reservation refused for insufficient stock.
pub fn record_reservation_rejected() {
    metrics::counter!("stock_ledger_reservations_total", "status" => "rejected").increment(1);
}

/// Record a retried reservation answered from its idempotency key.
pub fn record_reservation_replayed() {
    metrics::counter!("stock_ledger_reservations_total", "status" => "replayed").increment(1);
}

/// Record an explicit release.
pub fn record_reservation_released() {
    metrics::counter!("stock_ledger_reservations_total", "status" => "released").increment(1);
}

/// Record reservations released by a sweep.
pub fn record_reservations_expired(count: usize) {
    let count = u64::try_from(count).unwrap_or(u64::MAX);
    metrics::counter!("stock_ledger_reservations_total", "status" => "expired").increment(count);
    metrics::counter!("stock_ledger_sweep_released_total").increment(count);
}

/// Record a committed transfer.
pub fn record_transfer_completed(quantity: u32) {
    metrics::counter!("stock_ledger_transfers_total", "status" => "completed").increment(1);
    metrics::counter!("stock_ledger_transferred_units_total").increment(u64::from(quantity));
}

/// Record a transfer that did not move anything.
pub fn record_transfer_failed() {
    metrics::counter!("stock_ledger_transfers_total", "status" => "failed").increment(1);
}

/// Publish the size of the latest low-stock scan.
#[allow(clippy::cast_precision_loss)] // Alert counts are far below 2^52
pub fn record_low_stock_alerts(count: usize) {
    metrics::gauge!("stock_ledger_low_stock_alerts").set(count as f64);
}
