//! In-memory transactional ledger.
//!
//! Transactions take a store-wide lock for their whole lifetime, which gives
//! serializable isolation: the strongest form of the per-pair locking discipline
//! the engine relies on. Writes are staged inside the transaction and applied to
//! shared state only on commit, so a failed or dropped transaction leaves no trace.
//!
//! [`FaultPlan`] lets tests fail the n-th write or the commit of the next
//! transaction to prove that partial state is never observable.

use chrono::{DateTime, Duration, Utc};
use stock_ledger_core::{
    InventoryItem, InventoryStore, LedgerTransaction, ProductId, ReservationId, StockReservation,
    StockTransfer, StoreError, WarehouseId,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type ItemKey = (ProductId, WarehouseId);

#[derive(Debug, Default)]
struct LedgerState {
    items: HashMap<ItemKey, InventoryItem>,
    reservations: HashMap<ReservationId, StockReservation>,
    transfers: Vec<StockTransfer>,
}

impl LedgerState {
    fn active_sum<'a>(
        reservations: impl Iterator<Item = &'a StockReservation>,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> u64 {
        reservations
            .filter(|r| {
                r.product_id == product_id && r.warehouse_id == warehouse_id && r.is_active(now)
            })
            .map(|r| u64::from(r.quantity))
            .sum()
    }
}

/// One-shot failure plan applied to the next transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Fail the n-th write (1-based) issued inside the transaction
    pub fail_on_write: Option<usize>,
    /// Fail the commit itself
    pub fail_commit: bool,
    /// Reject the n-th write (1-based) as a constraint violation
    pub reject_on_write: Option<usize>,
}

/// In-memory implementation of [`InventoryStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    state: Arc<AsyncMutex<LedgerState>>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl InMemoryInventoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a failure for the next transaction. Consumed by [`InventoryStore::begin`].
    pub fn inject_fault(&self, plan: FaultPlan) {
        *self.faults.lock().unwrap() = plan;
    }

    /// Insert a reservation directly, bypassing the engine (e.g. one that is already expired).
    pub async fn put_reservation(&self, reservation: StockReservation) {
        self.state
            .lock()
            .await
            .reservations
            .insert(reservation.reservation_id.clone(), reservation);
    }

    /// Every reservation, oldest first
    pub async fn all_reservations(&self) -> Vec<StockReservation> {
        let state = self.state.lock().await;
        let mut reservations: Vec<_> = state.reservations.values().cloned().collect();
        reservations.sort_by_key(|r| r.created_at);
        reservations
    }

    /// Every recorded transfer, in commit order
    pub async fn all_transfers(&self) -> Vec<StockTransfer> {
        self.state.lock().await.transfers.clone()
    }
}

impl InventoryStore for InMemoryInventoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, StoreError> {
        let faults = std::mem::take(&mut *self.faults.lock().unwrap());
        let guard = Arc::clone(&self.state).lock_owned().await;
        Ok(InMemoryTransaction {
            guard,
            staged_items: HashMap::new(),
            staged_reservations: Vec::new(),
            staged_transfers: Vec::new(),
            faults,
            writes: 0,
        })
    }

    async fn get_item(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .items
            .get(&(product_id, warehouse_id))
            .cloned())
    }

    async fn items_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<InventoryItem>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|item| item.product_id == product_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.warehouse_id);
        Ok(items)
    }

    async fn items_for_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<InventoryItem>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<_> = state
            .items
            .values()
            .filter(|item| item.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        items.sort_by_key(|item| item.product_id);
        Ok(items)
    }

    async fn active_reserved_quantity(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(LedgerState::active_sum(
            state.reservations.values(),
            product_id,
            warehouse_id,
            now,
        ))
    }

    async fn get_reservation(
        &self,
        id: &ReservationId,
    ) -> Result<Option<StockReservation>, StoreError> {
        Ok(self.state.lock().await.reservations.get(id).cloned())
    }

    async fn active_reservations_for_product(
        &self,
        product_id: ProductId,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>, StoreError> {
        let state = self.state.lock().await;
        let mut active: Vec<_> = state
            .reservations
            .values()
            .filter(|r| r.product_id == product_id && r.is_active(now))
            .cloned()
            .collect();
        active.sort_by_key(|r| r.created_at);
        Ok(active)
    }

    async fn mark_released(
        &self,
        id: &ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Option<StockReservation>, StoreError> {
        let mut state = self.state.lock().await;
        match state.reservations.get_mut(id) {
            Some(reservation) if reservation.released_at.is_none() => {
                reservation.released_at = Some(now);
                Ok(Some(reservation.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn extend_reservation(
        &self,
        id: &ReservationId,
        additional_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<Option<StockReservation>, StoreError> {
        let mut state = self.state.lock().await;
        match state.reservations.get_mut(id) {
            Some(reservation) if reservation.is_active(now) => {
                reservation.expires_at += Duration::minutes(i64::from(additional_minutes));
                Ok(Some(reservation.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn release_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockReservation>, StoreError> {
        let mut state = self.state.lock().await;
        let mut released: Vec<_> = state
            .reservations
            .values_mut()
            .filter(|r| r.released_at.is_none() && r.expires_at <= now)
            .map(|r| {
                r.released_at = Some(now);
                r.clone()
            })
            .collect();
        released.sort_by_key(|r| r.created_at);
        Ok(released)
    }

    async fn transfers_for_product(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<StockTransfer>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .transfers
            .iter()
            .rev()
            .filter(|t| t.product_id == product_id)
            .cloned()
            .collect())
    }

    async fn receive_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem, StoreError> {
        let mut state = self.state.lock().await;
        let item = state
            .items
            .entry((product_id, warehouse_id))
            .or_insert_with(|| InventoryItem::empty(product_id, warehouse_id, now));
        item.available_quantity = item
            .available_quantity
            .checked_add(quantity)
            .ok_or_else(|| StoreError::Constraint("available_quantity overflow".to_string()))?;
        item.last_updated = now;
        Ok(item.clone())
    }
}

/// Transaction over [`InMemoryInventoryStore`].
///
/// Holds the store lock until committed, rolled back or dropped.
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<LedgerState>,
    staged_items: HashMap<ItemKey, InventoryItem>,
    staged_reservations: Vec<StockReservation>,
    staged_transfers: Vec<StockTransfer>,
    faults: FaultPlan,
    writes: usize,
}

impl InMemoryTransaction {
    fn record_write(&mut self, operation: &str) -> Result<(), StoreError> {
        self.writes += 1;
        if self.faults.fail_on_write == Some(self.writes) {
            return Err(StoreError::Injected(format!(
                "write #{} ({operation})",
                self.writes
            )));
        }
        if self.faults.reject_on_write == Some(self.writes) {
            return Err(StoreError::Constraint(format!(
                "write #{} ({operation}) rejected",
                self.writes
            )));
        }
        Ok(())
    }

    fn current_item(&self, key: ItemKey) -> Option<InventoryItem> {
        self.staged_items
            .get(&key)
            .or_else(|| self.guard.items.get(&key))
            .cloned()
    }
}

impl LedgerTransaction for InMemoryTransaction {
    async fn lock_item(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<InventoryItem>, StoreError> {
        Ok(self.current_item((product_id, warehouse_id)))
    }

    async fn active_reserved_quantity(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(LedgerState::active_sum(
            self.guard
                .reservations
                .values()
                .chain(self.staged_reservations.iter()),
            product_id,
            warehouse_id,
            now,
        ))
    }

    async fn find_reservation_by_key(
        &mut self,
        idempotency_key: &str,
    ) -> Result<Option<StockReservation>, StoreError> {
        Ok(self
            .guard
            .reservations
            .values()
            .chain(self.staged_reservations.iter())
            .find(|r| r.idempotency_key.as_deref() == Some(idempotency_key))
            .cloned())
    }

    async fn insert_reservation(
        &mut self,
        reservation: &StockReservation,
    ) -> Result<(), StoreError> {
        self.record_write("insert_reservation")?;
        let duplicate = self.guard.reservations.contains_key(&reservation.reservation_id)
            || self
                .staged_reservations
                .iter()
                .any(|r| r.reservation_id == reservation.reservation_id);
        if duplicate {
            return Err(StoreError::Constraint(format!(
                "duplicate reservation id {}",
                reservation.reservation_id
            )));
        }
        self.staged_reservations.push(reservation.clone());
        Ok(())
    }

    async fn adjust_available(
        &mut self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        delta: i64,
        now: DateTime<Utc>,
    ) -> Result<InventoryItem, StoreError> {
        self.record_write("adjust_available")?;
        let key = (product_id, warehouse_id);
        let mut item = self
            .current_item(key)
            .unwrap_or_else(|| InventoryItem::empty(product_id, warehouse_id, now));

        let updated = i64::from(item.available_quantity) + delta;
        item.available_quantity = u32::try_from(updated).map_err(|_| {
            StoreError::Constraint(format!(
                "available_quantity would become {updated} for product {product_id} in warehouse {warehouse_id}"
            ))
        })?;
        item.last_updated = now;

        self.staged_items.insert(key, item.clone());
        Ok(item)
    }

    async fn insert_transfer(&mut self, transfer: &StockTransfer) -> Result<(), StoreError> {
        self.record_write("insert_transfer")?;
        self.staged_transfers.push(transfer.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        if self.faults.fail_commit {
            return Err(StoreError::Injected("commit".to_string()));
        }

        let Self {
            mut guard,
            staged_items,
            staged_reservations,
            staged_transfers,
            ..
        } = self;

        guard.items.extend(staged_items);
        for reservation in staged_reservations {
            guard
                .reservations
                .insert(reservation.reservation_id.clone(), reservation);
        }
        guard.transfers.extend(staged_transfers);
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
