//! Stock ledger and reservation store traits.
//!
//! # Design
//!
//! The store exposes two surfaces:
//!
//! - [`InventoryStore`]: point reads, bounded scans and single-statement conditional
//!   updates that are safe without an explicit transaction (release, extend, sweep).
//! - [`LedgerTransaction`]: a unit of work for the read-check-write sequences that
//!   must be atomic (reserve, transfer). A transaction either commits every write or
//!   none of them. Dropping it without calling [`LedgerTransaction::commit`] rolls
//!   it back.
//!
//! # Locking Discipline
//!
//! [`LedgerTransaction::lock_item`] must serialize concurrent transactions on the
//! same `(product, warehouse)` pair until commit or rollback. The `PostgreSQL`
//! backend uses `SELECT ... FOR UPDATE`; the in-memory backend holds a store-wide
//! lock for the lifetime of the transaction. Without it two concurrent reservations
//! could both pass the availability check and jointly oversell.
//!
//! # Persisted Layout
//!
//! - `inventory_items` keyed by `(product_id, warehouse_id)`
//! - `stock_reservations` keyed by `reservation_id`, indexed on
//!   `(product_id, warehouse_id, released_at, expires_at)`
//! - `stock_transfers` keyed by `id`

use crate::error::StoreError;
use crate::types::{
    InventoryItem, ProductId, ReservationId, StockReservation, StockTransfer, WarehouseId,
};
use chrono::{DateTime, Utc};
use std::future::Future;

/// Durable ledger and reservation storage.
pub trait InventoryStore: Send + Sync {
    /// Transaction handle returned by [`InventoryStore::begin`].
    type Tx: LedgerTransaction;

    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns error if a connection cannot be acquired.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;

    /// Ledger row for a pair, if one has ever been created.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn get_item(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Option<InventoryItem>, StoreError>> + Send;

    /// Every ledger row for a product, one per warehouse holding it.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn items_for_product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<InventoryItem>, StoreError>> + Send;

    /// Every ledger row in a warehouse.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn items_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Vec<InventoryItem>, StoreError>> + Send;

    /// Sum of quantities of reservations that are unreleased and unexpired at `now`.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn active_reserved_quantity(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Reservation by id, in any state.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn get_reservation(
        &self,
        id: &ReservationId,
    ) -> impl Future<Output = Result<Option<StockReservation>, StoreError>> + Send;

    /// Reservations for a product that are active at `now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn active_reservations_for_product(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<StockReservation>, StoreError>> + Send;

    /// Set `released_at = now` if the reservation exists and is unreleased.
    ///
    /// Returns the updated reservation, or `None` when nothing matched (missing or
    /// already released). The check and the update are a single atomic step.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be updated.
    fn mark_released(
        &self,
        id: &ReservationId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<StockReservation>, StoreError>> + Send;

    /// Push `expires_at` forward by `additional_minutes` if the reservation is
    /// still active at `now`.
    ///
    /// Returns the updated reservation, or `None` when nothing matched.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be updated.
    fn extend_reservation(
        &self,
        id: &ReservationId,
        additional_minutes: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<StockReservation>, StoreError>> + Send;

    /// Release every reservation with `released_at IS NULL AND expires_at <= now`.
    ///
    /// Idempotent: a second call at the same instant matches nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be updated.
    fn release_expired(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<StockReservation>, StoreError>> + Send;

    /// Transfers recorded for a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn transfers_for_product(
        &self,
        product_id: ProductId,
    ) -> impl Future<Output = Result<Vec<StockTransfer>, StoreError>> + Send;

    /// External stock receipt: add `quantity` units to a pair, creating the row
    /// at zero first if needed.
    ///
    /// Receipts are owned by the purchasing side of the business; the ledger
    /// exposes this hook so that side (and tests) can feed it.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be updated.
    fn receive_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<InventoryItem, StoreError>> + Send;
}

/// Unit of work over the ledger and reservation store.
pub trait LedgerTransaction: Send {
    /// Read a ledger row and lock the pair until the transaction ends.
    ///
    /// Returns `None` when no row exists yet.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn lock_item(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> impl Future<Output = Result<Option<InventoryItem>, StoreError>> + Send;

    /// Same as [`InventoryStore::active_reserved_quantity`], seeing this
    /// transaction's uncommitted writes.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn active_reserved_quantity(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Reservation previously created with this idempotency key.
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be queried.
    fn find_reservation_by_key(
        &mut self,
        idempotency_key: &str,
    ) -> impl Future<Output = Result<Option<StockReservation>, StoreError>> + Send;

    /// Insert a new reservation record.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails (including duplicate ids or keys).
    fn insert_reservation(
        &mut self,
        reservation: &StockReservation,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Add `delta` (possibly negative) to a pair's available quantity.
    ///
    /// Creates the row at zero first when absent. Fails with
    /// [`StoreError::Constraint`] rather than let the quantity go negative.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails or would violate the non-negative invariant.
    fn adjust_available(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<InventoryItem, StoreError>> + Send;

    /// Record a transfer.
    ///
    /// # Errors
    ///
    /// Returns error if the write fails.
    fn insert_transfer(
        &mut self,
        transfer: &StockTransfer,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Make every write visible atomically.
    ///
    /// # Errors
    ///
    /// Returns error if the commit fails; nothing is applied in that case.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Discard every write.
    ///
    /// # Errors
    ///
    /// Returns error if the backend reports a failure while rolling back.
    fn rollback(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
