//! Catalog lookup trait.
//!
//! Products and warehouses are maintained by an external catalog service. The ledger
//! reads them to validate requests, rank warehouses by distance and compute
//! reorder suggestions. The only write it performs is the reorder-level update.

use crate::error::StoreError;
use crate::types::{Product, ProductId, Warehouse, WarehouseId};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Catalog repository.
///
/// Implementations must be `Send + Sync` so they can be shared behind an `Arc`
/// between request handlers and the background expiry sweeper.
pub trait Catalog: Send + Sync {
    /// Look up a product by id.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be queried.
    fn get_product(
        &self,
        id: ProductId,
    ) -> impl Future<Output = Result<Option<Product>, StoreError>> + Send;

    /// Look up a warehouse by id.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be queried.
    fn get_warehouse(
        &self,
        id: WarehouseId,
    ) -> impl Future<Output = Result<Option<Warehouse>, StoreError>> + Send;

    /// Look up several warehouses at once. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be queried.
    fn get_warehouses_by_ids(
        &self,
        ids: &[WarehouseId],
    ) -> impl Future<Output = Result<Vec<Warehouse>, StoreError>> + Send;

    /// All warehouses flagged active.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be queried.
    fn list_active_warehouses(
        &self,
    ) -> impl Future<Output = Result<Vec<Warehouse>, StoreError>> + Send;

    /// All products flagged active.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be queried.
    fn list_active_products(&self)
    -> impl Future<Output = Result<Vec<Product>, StoreError>> + Send;

    /// Set a product's reorder level and touch its update timestamp.
    ///
    /// Returns `false` when the product does not exist.
    ///
    /// # Errors
    ///
    /// Returns error if the backing store cannot be updated.
    fn update_reorder_level(
        &self,
        id: ProductId,
        reorder_level: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;
}
