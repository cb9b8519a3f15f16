//! # Stock Ledger Core
//!
//! Core types and traits for the inventory stock ledger and reservation engine.
//!
//! This crate owns the vocabulary shared by every other crate in the workspace:
//!
//! - **Domain types**: products, warehouses, ledger rows, reservations, transfers
//! - **Errors**: the business error taxonomy surfaced to callers
//! - **Providers**: the `Catalog` and `InventoryStore` traits that storage backends implement
//! - **Environment**: the `Clock` used to decide reservation expiry
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────┐
//! │ Reservation Engine   │      │ Multi-Warehouse      │
//! │ Low-Stock Monitor    │      │ Allocator            │
//! └──────────┬───────────┘      └──────────┬───────────┘
//!            │                             │
//!            ▼                             ▼
//!     ┌─────────────┐             ┌─────────────────┐
//!     │   Catalog   │             │ InventoryStore  │──► LedgerTransaction
//!     └─────────────┘             └─────────────────┘
//! ```
//!
//! Implementations:
//!
//! - `stock-ledger-postgres`: `PostgreSQL` via sqlx (production)
//! - `stock-ledger-testing`: in-memory, with fault injection (tests)

pub mod catalog;
pub mod error;
pub mod store;
pub mod types;

pub use catalog::Catalog;
pub use error::{ErrorKind, InventoryError, StoreError};
pub use store::{InventoryStore, LedgerTransaction};
pub use types::*;

/// Environment module - Dependency injection traits
///
/// All time-dependent decisions (reservation expiry, ledger timestamps) go through
/// the [`Clock`](environment::Clock) so tests can pin or advance time.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use stock_ledger_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
