//! # Stock Ledger Testing
//!
//! Testing utilities for the stock ledger.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`MockClock`])
//! - [`InMemoryCatalog`]: `HashMap`-backed product and warehouse catalog
//! - [`InMemoryInventoryStore`]: transactional in-memory ledger with fault injection
//! - [`fixtures`]: builders for products and warehouses
//!
//! ## Example
//!
//! ```
//! use stock_ledger_testing::{fixtures, InMemoryCatalog, InMemoryInventoryStore, test_clock};
//! use stock_ledger_core::{environment::Clock, InventoryStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let clock = test_clock();
//! let product = fixtures::product("SKU-1", 20, 1_500);
//! let warehouse = fixtures::warehouse("W1", 1_000, Some((52.37, 4.90)));
//! let catalog = InMemoryCatalog::new()
//!     .with_product(product.clone())
//!     .with_warehouse(warehouse.clone());
//!
//! let store = InMemoryInventoryStore::new();
//! store.receive_stock(product.id, warehouse.id, 100, clock.now()).await?;
//! # Ok(())
//! # }
//! ```

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

mod catalog;
pub mod fixtures;
mod store;

pub use catalog::InMemoryCatalog;
pub use mocks::{FixedClock, MockClock, test_clock};
pub use store::{FaultPlan, InMemoryInventoryStore, InMemoryTransaction};

/// Mock implementations of Environment traits
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use stock_ledger_core::environment::Clock;
    use std::sync::{Arc, Mutex};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use stock_ledger_testing::mocks::FixedClock;
    /// use stock_ledger_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that stands still until a test moves it.
    ///
    /// Clones share the same instant, so a test can hand one clone to the engine
    /// and keep another to advance time past reservation expiry.
    #[derive(Debug, Clone)]
    pub struct MockClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl MockClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward
        pub fn advance(&self, by: Duration) {
            let mut time = self.time.lock().unwrap();
            *time += by;
        }

        /// Jump to an absolute instant
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap() = to;
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2024-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        )
    }
}
