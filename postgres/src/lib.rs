//! `PostgreSQL` backend for the stock ledger.
//!
//! Implements [`Catalog`](stock_ledger_core::Catalog) and
//! [`InventoryStore`](stock_ledger_core::InventoryStore) on top of a sqlx pool:
//!
//! - Ledger rows are locked with `SELECT ... FOR UPDATE` inside a transaction
//! - Quantity changes are `INSERT ... ON CONFLICT DO UPDATE`, so rows are created lazily
//! - `CHECK (available_quantity >= 0)` backs the non-negative invariant at the storage level
//! - Release, extend and sweep are single conditional `UPDATE ... RETURNING` statements
//!
//! # Example
//!
//! ```no_run
//! use stock_ledger_postgres::{PostgresCatalog, PostgresInventoryStore, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::PgPool::connect("postgres://localhost/stock_ledger").await?;
//! migrate(&pool).await?;
//!
//! let store = PostgresInventoryStore::new(pool.clone());
//! let catalog = PostgresCatalog::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod rows;
mod store;

pub use catalog::PostgresCatalog;
pub use store::{PostgresInventoryStore, PostgresTransaction};

use sqlx::PgPool;
use stock_ledger_core::StoreError;

/// Apply the schema migrations embedded from `./migrations`.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Stock ledger migrations applied");
    Ok(())
}

/// Map a sqlx error, keeping constraint violations distinguishable.
fn store_error(context: &str, error: &sqlx::Error) -> StoreError {
    let violated = error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code.starts_with("23"));

    if violated {
        StoreError::Constraint(format!("{context}: {error}"))
    } else {
        StoreError::Database(format!("{context}: {error}"))
    }
}
