//! # Stock Ledger Engine
//!
//! Reservation engine, multi-warehouse allocator and low-stock monitor over a
//! transactional [`InventoryStore`](stock_ledger_core::InventoryStore) and a
//! read-only [`Catalog`](stock_ledger_core::Catalog).
//!
//! ## Components
//!
//! - [`ReservationEngine`]: effective availability, reserve, release, extend, expiry sweep
//! - [`WarehouseAllocator`]: cross-warehouse availability, nearest-first allocation,
//!   atomic transfers, utilization
//! - [`LowStockMonitor`]: alerts, reorder suggestions, stock-level report
//! - [`ExpirySweeper`]: background task running the sweep on an interval
//! - [`StockLedger`]: facade wiring the three engines over shared collaborators
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stock_ledger_core::environment::Clock;
//! use stock_ledger_core::InventoryStore;
//! use stock_ledger_engine::{Config, ReserveRequest, StockLedger};
//! use stock_ledger_testing::{fixtures, test_clock, InMemoryCatalog, InMemoryInventoryStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let product = fixtures::product("SKU-1", 20, 1_500);
//! let warehouse = fixtures::warehouse("W1", 1_000, None);
//! let catalog = InMemoryCatalog::new()
//!     .with_product(product.clone())
//!     .with_warehouse(warehouse.clone());
//! let store = InMemoryInventoryStore::new();
//! store.receive_stock(product.id, warehouse.id, 100, test_clock().now()).await?;
//!
//! let ledger = StockLedger::new(
//!     Arc::new(store),
//!     Arc::new(catalog),
//!     Arc::new(test_clock()),
//!     &Config::default(),
//! );
//!
//! let outcome = ledger
//!     .reserve(ReserveRequest::new(product.id, warehouse.id, 40, 30))
//!     .await;
//! assert!(outcome.success);
//! assert_eq!(
//!     ledger.reservations().effective_available(product.id, warehouse.id).await?,
//!     60
//! );
//! # Ok(())
//! # }
//! ```

pub mod allocation;
pub mod config;
pub mod geo;
pub mod metrics;
pub mod monitor;
pub mod outcome;
pub mod reservation;
pub mod retry;
pub mod service;
pub mod sweeper;

pub use allocation::{
    Allocation, AllocationReason, AvailabilityReport, TransferRequest, UtilizationReport,
    WarehouseAllocator, WarehouseStock,
};
pub use config::{Config, ConfigError};
pub use monitor::{
    AlertSeverity, LowStockAlert, LowStockMonitor, ReorderSuggestion, StockLevelReport,
    WarehouseStockLevel,
};
pub use outcome::OperationOutcome;
pub use reservation::{ReservationEngine, ReservationPolicy, ReserveRequest};
pub use retry::RetryPolicy;
pub use service::StockLedger;
pub use sweeper::ExpirySweeper;

use stock_ledger_core::LedgerTransaction;

/// Roll back an abandoned transaction, logging (not propagating) backend failures.
///
/// The caller is already returning the error that made it abandon the work.
async fn discard<T: LedgerTransaction>(tx: T) {
    if let Err(error) = tx.rollback().await {
        tracing::warn!(%error, "Rollback failed");
    }
}
